pub mod config;
pub mod error;
pub mod events;
pub mod highlight;
pub mod index;
pub mod playback;
pub mod scheduler;
pub mod session;
pub mod transcript;
pub mod vocabulary;

pub use config::Config;
pub use error::{PlayerError, Result};
pub use events::{EventEmitter, PlayerEvent};
pub use highlight::{HighlightAction, HighlightProjector, HighlightState, WordChanged};
pub use index::WordIndex;
pub use playback::{AudioSource, LoopController, SimulatedSource};
pub use scheduler::TimingScheduler;
pub use session::{PlayerSession, SessionSnapshot};
pub use transcript::{Sentence, Transcript, Word};
pub use vocabulary::{JsonVocabulary, VocabularyStore};
