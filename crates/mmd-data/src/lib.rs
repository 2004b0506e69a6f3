//! Block-wise streaming of two-sample data
//!
//! Samples from each distribution are read in bursts of fixed-size
//! [`Block`]s. A block is an index-range view over a shared collection, so
//! in-memory data is never copied. Sources can also stream from CSV files or
//! generate synthetic data on the fly. A [`TrainTestSplit`] restricts passes
//! to a training or a held-out part of every source.
//!
//! # Example
//!
//! ```rust
//! use mmd_core::DenseFeatures;
//! use mmd_data::DataManager;
//!
//! let p = DenseFeatures::new(1, (0..8).map(f64::from).collect()).unwrap();
//! let q = DenseFeatures::new(1, (8..16).map(f64::from).collect()).unwrap();
//! let mut data = DataManager::from_features(p.into_shared(), q.into_shared()).unwrap();
//! data.set_blocksize(4).unwrap();
//! data.set_num_blocks_per_burst(2).unwrap();
//!
//! let mut blocks = 0;
//! for burst in data.stream().unwrap() {
//!     blocks += burst.unwrap().num_blocks();
//! }
//! assert_eq!(blocks, 4);
//! ```

pub mod block;
pub mod csv_source;
pub mod data_manager;
pub mod generator;
pub mod next_samples;
pub mod source;
pub mod split;

pub use block::Block;
pub use csv_source::CsvSource;
pub use data_manager::{DataManager, StreamGuard};
pub use generator::MeanShiftGenerator;
pub use next_samples::NextSamples;
pub use source::{DataSource, InMemorySource};
pub use split::{SampleSplit, TrainTestSplit, DEFAULT_TRAIN_TEST_RATIO};
