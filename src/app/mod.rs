// Application layer - Use case interactors

pub mod compress_interactor;
pub mod container;
pub mod inspect_interactor;

// Re-export interactors
pub use compress_interactor::{Compressor, PlanPreview};
pub use container::{AppContainer, DefaultAppContainer};
pub use inspect_interactor::InspectInteractor;
