//! Block-wise, burst-wise retrieval of samples from several distributions
//!
//! A [`DataManager`] owns one [`DataSource`] per distribution. A pass over
//! the data is bracketed by `start()` and `end()`, or by the RAII guard that
//! [`DataManager::stream`] returns. Inside a pass, every `next()` call yields
//! up to `num_blocks_per_burst` blocks per distribution as a [`NextSamples`].
//!
//! The total blocksize given to [`DataManager::set_blocksize`] is split across
//! distributions in proportion to their sample counts, so each block of `p`
//! pairs with a block of `q` and every distribution runs out of blocks at the
//! same burst. Sources may hand out short chunks at any point; the manager
//! keeps reading until a burst is full, so only samples that cannot fill a
//! whole block at the tail of a stream are dropped. A distribution that
//! cannot form a single block in a burst makes the burst empty, which ends
//! the pass.
//!
//! In train/test mode (see [`TrainTestSplit`]) a pass reads only the training
//! or only the held-out part of every source, and block sizes are derived
//! from the sample counts of that part.

use crate::block::Block;
use crate::next_samples::NextSamples;
use crate::source::{DataSource, InMemorySource};
use crate::split::TrainTestSplit;
use mmd_core::math::gcd;
use mmd_core::{DenseFeatures, Error, Features, Result};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Streams paired blocks from one source per distribution
#[derive(Debug)]
pub struct DataManager {
    sources: Vec<Option<Box<dyn DataSource>>>,
    blocksizes: Vec<usize>,
    num_blocks_per_burst: usize,
    split: TrainTestSplit,
    /// Samples each source may still hand out in the current pass
    remaining: Vec<usize>,
    streaming: bool,
}

impl DataManager {
    /// Manager for `num_distributions` distributions, with no sources set
    pub fn new(num_distributions: usize) -> Self {
        Self {
            sources: (0..num_distributions).map(|_| None).collect(),
            blocksizes: vec![0; num_distributions],
            num_blocks_per_burst: 1,
            split: TrainTestSplit::default(),
            remaining: vec![0; num_distributions],
            streaming: false,
        }
    }

    /// Manager over two in-memory sample collections
    pub fn from_features(p: Arc<dyn Features>, q: Arc<dyn Features>) -> Result<Self> {
        let mut manager = Self::new(2);
        manager.set_features(0, p)?;
        manager.set_features(1, q)?;
        Ok(manager)
    }

    pub fn num_distributions(&self) -> usize {
        self.sources.len()
    }

    fn ensure_idle(&self, operation: &str) -> Result<()> {
        if self.streaming {
            return Err(Error::State(format!(
                "cannot {operation} while a streaming pass is in progress"
            )));
        }
        Ok(())
    }

    /// Install the source of distribution `index`
    ///
    /// Blocksizes are cleared, since they depend on the sample counts.
    pub fn set_source(&mut self, index: usize, source: Box<dyn DataSource>) -> Result<()> {
        self.ensure_idle("replace a data source")?;
        let len = self.sources.len();
        let slot = self
            .sources
            .get_mut(index)
            .ok_or_else(|| Error::index(index, len, "distributions"))?;
        *slot = Some(source);
        self.clear_blocksizes();
        Ok(())
    }

    fn clear_blocksizes(&mut self) {
        self.blocksizes.iter_mut().for_each(|b| *b = 0);
    }

    /// Install an in-memory source for distribution `index`
    pub fn set_features(&mut self, index: usize, features: Arc<dyn Features>) -> Result<()> {
        self.set_source(index, Box::new(InMemorySource::new(features)))
    }

    /// Source of distribution `index`
    pub fn source_at(&self, index: usize) -> Result<&dyn DataSource> {
        self.sources
            .get(index)
            .ok_or_else(|| Error::index(index, self.sources.len(), "distributions"))?
            .as_deref()
            .ok_or_else(|| Error::Precondition(format!("no data source set for distribution {index}")))
    }

    /// Samples of distribution `index` read by a pass in the current split
    pub fn num_samples_at(&self, index: usize) -> Result<usize> {
        Ok(self.sample_range_at(index)?.len())
    }

    /// Samples distribution `index` holds, ignoring any split
    pub fn total_samples_at(&self, index: usize) -> Result<usize> {
        Ok(self.source_at(index)?.num_samples())
    }

    /// Positions within source `index` that a pass reads
    pub fn sample_range_at(&self, index: usize) -> Result<Range<usize>> {
        Ok(self.split.range(self.source_at(index)?.num_samples()))
    }

    /// Samples per pass summed over all distributions
    pub fn num_samples(&self) -> Result<usize> {
        (0..self.sources.len()).map(|i| self.num_samples_at(i)).sum()
    }

    fn sample_counts(&self) -> Result<Vec<usize>> {
        if self.sources.is_empty() {
            return Err(Error::Precondition("no distributions configured".to_string()));
        }
        let counts = (0..self.sources.len())
            .map(|i| self.num_samples_at(i))
            .collect::<Result<Vec<_>>>()?;
        if counts.iter().any(|&m| m == 0) {
            return Err(Error::InsufficientData {
                expected: 1,
                actual: 0,
            });
        }
        Ok(counts)
    }

    /// The train/test partition passes read from
    pub fn train_test_split(&self) -> &TrainTestSplit {
        &self.split
    }

    pub fn is_train_test_mode(&self) -> bool {
        self.split.is_train_test_mode()
    }

    pub fn is_train_mode(&self) -> bool {
        self.split.is_train_mode()
    }

    pub fn train_test_ratio(&self) -> f64 {
        self.split.ratio()
    }

    /// Enable the train/test partition in train mode, or disable it
    ///
    /// Disabling restores the default ratio. Blocksizes are cleared, since
    /// they depend on the sample counts a pass reads.
    pub fn set_train_test_mode(&mut self, on: bool) -> Result<()> {
        self.ensure_idle("switch train/test mode")?;
        if let Some(d) = self.sources.iter().position(Option::is_none) {
            return Err(Error::Precondition(format!(
                "no data source set for distribution {d}"
            )));
        }
        self.split.set_train_test_mode(on);
        self.clear_blocksizes();
        debug!(on, ratio = self.split.ratio(), "train/test mode");
        Ok(())
    }

    /// Read the training part (`true`) or the held-out part (`false`)
    pub fn set_train_mode(&mut self, on: bool) -> Result<()> {
        self.ensure_idle("switch between train and test samples")?;
        self.split.set_train_mode(on)?;
        self.clear_blocksizes();
        debug!(split = ?self.split.mode(), "train mode");
        Ok(())
    }

    /// Training samples per held-out sample
    pub fn set_train_test_ratio(&mut self, ratio: f64) -> Result<()> {
        self.ensure_idle("change the train/test ratio")?;
        self.split.set_train_test_ratio(ratio)?;
        self.clear_blocksizes();
        Ok(())
    }

    /// Smallest total blocksize that splits into whole per-distribution blocks
    pub fn min_blocksize(&self) -> Result<usize> {
        let counts = self.sample_counts()?;
        let total: usize = counts.iter().sum();
        let divisor = counts.iter().fold(0, |acc, &m| gcd(acc, m));
        if divisor == 0 {
            return Err(Error::InsufficientData {
                expected: 1,
                actual: 0,
            });
        }
        Ok(total / divisor)
    }

    /// Set the total blocksize, split across distributions by sample share
    ///
    /// Distribution `d` with `m_d` of the `n` samples gets blocks of
    /// `blocksize * m_d / n`, which must be a whole number.
    pub fn set_blocksize(&mut self, blocksize: usize) -> Result<()> {
        self.ensure_idle("change the blocksize")?;
        let counts = self.sample_counts()?;
        let n: usize = counts.iter().sum();
        if blocksize == 0 || blocksize > n {
            return Err(Error::InvalidArgument(format!(
                "blocksize {blocksize} must be in [1, {n}]"
            )));
        }
        if n % blocksize != 0 {
            return Err(Error::InvalidArgument(format!(
                "blocksize {blocksize} does not divide the {n} total samples"
            )));
        }

        let mut sizes = Vec::with_capacity(counts.len());
        for (d, &m) in counts.iter().enumerate() {
            if (blocksize * m) % n != 0 {
                return Err(Error::InvalidArgument(format!(
                    "blocksize {blocksize} gives distribution {d} a fractional block ({blocksize} * {m} / {n}); \
                     use a multiple of {}",
                    self.min_blocksize()?
                )));
            }
            sizes.push(blocksize * m / n);
        }
        debug!(blocksize, per_distribution = ?sizes, "blocksize set");
        self.blocksizes = sizes;
        Ok(())
    }

    /// Blocksize of distribution `index`, zero while unset
    pub fn blocksize_at(&self, index: usize) -> Result<usize> {
        self.blocksizes
            .get(index)
            .copied()
            .ok_or_else(|| Error::index(index, self.blocksizes.len(), "distributions"))
    }

    /// Total blocksize, zero while unset
    pub fn blocksize(&self) -> usize {
        self.blocksizes.iter().sum()
    }

    /// Set how many blocks per distribution one `next()` call fetches
    ///
    /// Requests beyond the number of blocks in a pass are capped.
    pub fn set_num_blocks_per_burst(&mut self, num_blocks_per_burst: usize) -> Result<()> {
        self.ensure_idle("change the burst size")?;
        if num_blocks_per_burst == 0 {
            return Err(Error::InvalidArgument(
                "number of blocks per burst must be positive".to_string(),
            ));
        }
        let blocksize = self.blocksize();
        if blocksize == 0 {
            return Err(Error::Precondition(
                "blocksize must be set before the burst size".to_string(),
            ));
        }
        let max_blocks = self.num_samples()? / blocksize;
        self.num_blocks_per_burst = if num_blocks_per_burst > max_blocks {
            info!(
                requested = num_blocks_per_burst,
                max_blocks, blocksize, "capping number of blocks per burst"
            );
            max_blocks
        } else {
            num_blocks_per_burst
        };
        Ok(())
    }

    pub fn num_blocks_per_burst(&self) -> usize {
        self.num_blocks_per_burst
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Begin a pass over every source
    ///
    /// Sources are positioned at the start of the current split. If any
    /// source fails to start, those already started are ended again.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_idle("start a second pass")?;
        self.sample_counts()?;
        if self.blocksize() == 0 {
            return Err(Error::Precondition(
                "blocksize must be set before streaming".to_string(),
            ));
        }
        let ranges = (0..self.sources.len())
            .map(|i| self.sample_range_at(i))
            .collect::<Result<Vec<_>>>()?;

        for (i, range) in ranges.iter().enumerate() {
            let started = match self.sources[i].as_mut() {
                Some(source) => source
                    .start()
                    .and_then(|()| skip_samples(&mut **source, range.start)),
                None => Err(Error::Precondition(format!(
                    "no data source set for distribution {i}"
                ))),
            };
            if let Err(err) = started {
                for source in self.sources[..=i].iter_mut().flatten() {
                    if let Err(e) = source.end() {
                        warn!(error = %e, "failed to release data source");
                    }
                }
                return Err(err);
            }
        }
        self.remaining = ranges.iter().map(|r| r.len()).collect();
        self.streaming = true;
        debug!(
            blocksizes = ?self.blocksizes,
            num_blocks_per_burst = self.num_blocks_per_burst,
            split = ?self.split.mode(),
            "streaming pass started"
        );
        Ok(())
    }

    /// Fetch the next burst of blocks
    ///
    /// Returns an empty [`NextSamples`] once any distribution is exhausted.
    pub fn next(&mut self) -> Result<NextSamples> {
        if !self.streaming {
            return Err(Error::State("next() called outside a streaming pass".to_string()));
        }
        let burst = self.num_blocks_per_burst;
        let mut per_distribution = Vec::with_capacity(self.sources.len());
        for (d, slot) in self.sources.iter_mut().enumerate() {
            let source = slot.as_mut().ok_or_else(|| {
                Error::Precondition(format!("no data source set for distribution {d}"))
            })?;
            let size = self.blocksizes[d];
            let wanted = (burst * size).min(self.remaining[d]);
            let blocks = match fill_chunk(&mut **source, wanted)? {
                Some(chunk) => {
                    let available = chunk.num_vectors().min(wanted);
                    self.remaining[d] -= available;
                    let full = available / size;
                    if available % size != 0 {
                        debug!(
                            distribution = d,
                            dropped = available % size,
                            "dropping partial block at end of stream"
                        );
                    }
                    Block::create_blocks(&chunk, full, size)?
                }
                None => Vec::new(),
            };
            per_distribution.push(blocks);
        }

        let next = NextSamples::from_blocks(per_distribution);
        debug!(num_blocks = next.num_blocks(), "fetched burst");
        Ok(next)
    }

    /// End the pass on every source, reporting the first failure
    pub fn end(&mut self) -> Result<()> {
        let mut first_error = None;
        for source in self.sources.iter_mut().flatten() {
            if let Err(e) = source.end() {
                warn!(error = %e, "failed to release data source");
                first_error.get_or_insert(e);
            }
        }
        if self.streaming {
            debug!("streaming pass ended");
        }
        self.streaming = false;
        first_error.map_or(Ok(()), Err)
    }

    /// End any pass and return every source to its initial state
    pub fn reset(&mut self) -> Result<()> {
        let mut first_error = None;
        for source in self.sources.iter_mut().flatten() {
            if let Err(e) = source.reset() {
                first_error.get_or_insert(e);
            }
        }
        self.streaming = false;
        first_error.map_or(Ok(()), Err)
    }

    /// Start a pass and return a guard that ends it when dropped
    ///
    /// The guard iterates over the non-empty bursts of the pass.
    #[instrument(skip(self), fields(blocksize = self.blocksize()))]
    pub fn stream(&mut self) -> Result<StreamGuard<'_>> {
        self.start()?;
        Ok(StreamGuard {
            manager: self,
            done: false,
        })
    }
}

/// Read and discard the first `count` samples of a started source
fn skip_samples(source: &mut dyn DataSource, count: usize) -> Result<()> {
    let mut skipped = 0;
    while skipped < count {
        match source.next_chunk(count - skipped)? {
            Some(chunk) if !chunk.is_empty() => skipped += chunk.num_vectors(),
            _ => {
                return Err(Error::InsufficientData {
                    expected: count,
                    actual: skipped,
                })
            }
        }
    }
    Ok(())
}

/// Read until `wanted` samples are collected or the source runs dry
///
/// A single chunk is passed through as is; several short chunks are copied
/// into one collection.
fn fill_chunk(source: &mut dyn DataSource, wanted: usize) -> Result<Option<Arc<dyn Features>>> {
    let mut chunks: Vec<Arc<dyn Features>> = Vec::new();
    let mut collected = 0;
    while collected < wanted {
        match source.next_chunk(wanted - collected)? {
            Some(chunk) if !chunk.is_empty() => {
                collected += chunk.num_vectors();
                chunks.push(chunk);
            }
            _ => break,
        }
    }
    if chunks.len() <= 1 {
        return Ok(chunks.pop());
    }
    let dim = chunks[0].dim();
    let mut data = Vec::with_capacity(collected * dim);
    for chunk in &chunks {
        for i in 0..chunk.num_vectors() {
            data.extend_from_slice(chunk.vector(i)?);
        }
    }
    Ok(Some(DenseFeatures::new(dim, data)?.into_shared()))
}

/// A streaming pass that ends when the guard goes out of scope
#[derive(Debug)]
pub struct StreamGuard<'a> {
    manager: &'a mut DataManager,
    done: bool,
}

impl StreamGuard<'_> {
    /// End the pass now, reporting any release failure
    pub fn finish(self) -> Result<()> {
        let mut guard = self;
        guard.done = true;
        guard.manager.end()
    }

    pub fn manager(&self) -> &DataManager {
        &*self.manager
    }
}

impl Iterator for StreamGuard<'_> {
    type Item = Result<NextSamples>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.manager.next() {
            Ok(burst) if burst.is_empty() => {
                self.done = true;
                None
            }
            Ok(burst) => Some(Ok(burst)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        if self.manager.is_streaming() {
            if let Err(e) = self.manager.end() {
                warn!(error = %e, "failed to end streaming pass");
            }
        }
    }
}
