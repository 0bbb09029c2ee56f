pub mod crossfade;
pub mod cue_engine;
pub mod scene;
pub mod sequence;

pub use crossfade::{Crossfade, Fade};
pub use cue_engine::{CueEngine, CueTick};
pub use scene::{CueTiming, Scene};
pub use sequence::Sequence;
