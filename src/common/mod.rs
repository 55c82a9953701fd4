pub mod assertions;
pub mod error;
pub mod logging;
pub mod net;
