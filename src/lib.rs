pub mod clip;
pub mod config;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod layout;
pub mod marker;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod wav64;
pub mod wavfile;

pub use clip::{ClipProcessor, OnsetProbe, ProcessedClip};
pub use config::{ClipSettings, Config};
pub use container::{Container, ContainerParams, FrameSource};
pub use descriptor::{read_log, ClipDescriptor};
pub use error::{ClipError, Result};
pub use layout::SampleLayout;
pub use marker::{MarkerDetector, MarkerPosition};
pub use orchestrator::{Orchestrator, RunMode, RunSummary};
pub use planner::{ClipWindow, SegmentPlanner, TimelineOrigin};
pub use report::{generate_encode_script, write_encode_script, write_manifest, CompletionRecord, TagStep};
pub use wav64::Wave64Reader;
pub use wavfile::{WavReader, WavWriter};
