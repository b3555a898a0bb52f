pub mod cli;
pub mod config;
pub mod gateway;
pub mod note;
pub mod session;
pub mod store;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use gateway::{
    Authenticator, GatewayError, LocalGateway, NoteEvent, RemoteGateway, Subscription,
};
pub use note::{Note, NoteDraft};
pub use session::{FormMode, NoteSession, SubmitOutcome};
pub use store::NoteStore;
