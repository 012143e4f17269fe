//! rgoban-katago: KataGo analysis engine クライアント
//!
//! 子プロセスとして起動したKataGoと、1行1メッセージのJSONプロトコルで
//! やり取りする。クエリは何個でも並行して発行でき、応答は単一の
//! readerスレッドが `id` で照合して待ち手に引き渡す。

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod protocol;

pub use dispatcher::{Analyser, QueryClient, QueryHandle, QueryParams};
pub use engine::{EngineCommand, EngineProcess};
pub use error::KatagoError;
pub use protocol::{AnalysisQuery, EngineResponse, MoveInfo, RootInfo, VersionQuery};
