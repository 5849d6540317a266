//! The call engine: per-call state, options, stream reader/writer, the
//! driver that runs a call to completion, and the public handle (§4.5,
//! §4.6).

pub mod driver;
pub mod handle;
pub mod options;
pub mod reader;
pub mod state;
pub mod writer;

pub use handle::CallHandle;
pub use options::CallOptions;
pub use reader::ResponseStreamReader;
pub use state::{CallState, CallShared, TerminalOutcome};
pub use writer::RequestStreamWriter;
