//! A socket-based communication policy for peer-to-peer and collective
//! messaging: context/vaddr bootstrap through a signaling service, a framed
//! TCP wire protocol with delivery confirmation, and the collective
//! operations built on top of it.
extern crate bincode;
extern crate bit_vec;
extern crate crossbeam;
extern crate log;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod collective;
pub mod communicator;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod msgbox;
pub mod policy;
pub mod signaling;
pub mod transport;

pub use communicator::{Communicator, Context, ContextId, Vaddr};
pub use config::Configuration;
pub use error::GraybatError;
pub use event::{Event, Status};
pub use policy::CommunicationPolicy;
