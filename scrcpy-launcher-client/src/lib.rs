pub mod backend;
pub mod connect;
pub mod controller;
pub mod events;
pub mod launch;
pub mod logging;
pub mod progress;
pub mod scan;
pub mod session;
pub mod settings;
pub mod status;
pub mod suggest;
pub mod ws_backend;

pub use backend::{Backend, BackendError};
pub use controller::{ACTIONS, Action, Controller, ControllerOptions, DispatchError};
pub use session::{Notice, NoticeLevel, Session};
