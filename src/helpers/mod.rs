pub mod catalog;
pub mod message_store;
pub mod playlist_loader;
pub mod presentation;
pub mod publish_scheduler;
pub mod remote_process;
pub mod voice;

pub use catalog::{Catalog, CatalogError, CatalogTrack, MemoryCatalog};
pub use message_store::MessageStore;
pub use presentation::{Presenter, PublishError, TextPresenter};
pub use publish_scheduler::PublishScheduler;
pub use remote_process::RemoteProcess;
pub use voice::{NoopVoiceLink, VoiceLink};
