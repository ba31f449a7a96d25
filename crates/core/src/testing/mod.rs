//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the external codec engine and the duration
//! prober, so the pipeline can be exercised end to end without ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use segcast_core::testing::{MockEngineFactory, MockProber};
//!
//! let factory = Arc::new(MockEngineFactory::new());
//! factory.fail_exec_matching("seg_3_");
//! let prober = Arc::new(MockProber::new(30.0));
//!
//! let transcoder = ChunkedTranscoder::new(config, factory.clone(), prober);
//! ```

mod mock_engine;
mod mock_prober;

pub use mock_engine::{MockEngine, MockEngineFactory, RecordedExec};
pub use mock_prober::{MockProber, RecordedProbe};
