pub mod archive;
pub mod driver;
pub mod encoder;
pub mod policy;
pub mod render;
pub mod store;

pub use archive::{ArchiveEntry, read_sgf_archive};
pub use driver::analyse_game;
pub use encoder::{EncodedGameRecord, encode_value_map, quantize_winrate};
pub use policy::{
    MoveEvaluation, OnEngineError, PolicySettings, PositionEvaluation, analyse_position,
    select_deepen_moves, side_to_move,
};
pub use render::print_position;
pub use store::{IndexEntry, ResultStore, content_hash};
