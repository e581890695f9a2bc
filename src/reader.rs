use crate::error::{ResourceError, StxError};
use crate::fs::{normalize_path, FileSystem};
use crate::source::{Location, Source, SourceFile};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files queued by one include, plus the source that was active when the
/// include happened.
struct Chain {
    pending: VecDeque<PathBuf>,
    suspended: Source,
    origin: Location,
}

/// Feeds the parser from a stack of file chains. When the active source is
/// exhausted the next queued file of the innermost chain takes over, and
/// when a chain runs dry the source it interrupted resumes.
pub struct Reader<'fs> {
    fs: &'fs dyn FileSystem,
    source: Source,
    chains: Vec<Chain>,
}

impl<'fs> Reader<'fs> {
    pub fn new(fs: &'fs dyn FileSystem, source: Source) -> Self {
        Reader {
            fs,
            source,
            chains: Vec::new(),
        }
    }

    /// Loads the file at `path` and starts reading from it.
    pub fn open(fs: &'fs dyn FileSystem, path: &Path) -> Result<Self, StxError> {
        let path = normalize_path(path);
        let text = fs
            .read_to_string(&path)
            .map_err(|err| ResourceError::Unreadable {
                path: path.to_string_lossy().to_string(),
                message: err.to_string(),
            })?;
        log::info!("loaded {}", path.display());
        let file = Arc::new(SourceFile::from_path(path, text));
        Ok(Reader::new(fs, Source::from_file(file)))
    }

    #[must_use]
    pub fn file_system(&self) -> &'fs dyn FileSystem {
        self.fs
    }

    pub fn source(&mut self) -> &mut Source {
        &mut self.source
    }

    #[must_use]
    pub fn current(&self) -> &Source {
        &self.source
    }

    /// Whether there is anything left to read. Switches to the next file of
    /// the chain when the active one is exhausted; this is the only place
    /// where the active source changes, so checkpoints never span files.
    pub fn alive(&mut self) -> Result<bool, StxError> {
        loop {
            if !self.source.is_eof() {
                return Ok(true);
            }
            let Some(chain) = self.chains.last_mut() else {
                return Ok(false);
            };
            match chain.pending.pop_front() {
                Some(path) => {
                    let origin = chain.origin.clone();
                    self.source = self.load(&path, &origin, false)?;
                }
                None => {
                    if let Some(chain) = self.chains.pop() {
                        log::debug!("resuming {}", chain.suspended.file().name());
                        self.source = chain.suspended;
                    }
                }
            }
        }
    }

    /// Queues `paths` to be read right after the current position. The first
    /// one becomes active immediately.
    pub fn push_include(&mut self, paths: Vec<PathBuf>, origin: Location) -> Result<(), StxError> {
        let mut pending: VecDeque<PathBuf> = paths.into();
        let Some(first) = pending.pop_front() else {
            log::debug!("{origin}: include resolved to no files");
            return Ok(());
        };
        let next = self.load(&first, &origin, true)?;
        let suspended = std::mem::replace(&mut self.source, next);
        self.chains.push(Chain {
            pending,
            suspended,
            origin,
        });
        Ok(())
    }

    /// `including` is set when the active source is the one requesting the
    /// file, which makes it part of the open set.
    fn load(&self, path: &Path, origin: &Location, including: bool) -> Result<Source, StxError> {
        let is_open = |source: &Source| source.path() == Some(path);
        let current_open = including && is_open(&self.source);
        if current_open || self.chains.iter().any(|c| is_open(&c.suspended)) {
            let mut cycle: Vec<String> = self
                .chains
                .iter()
                .map(|c| c.suspended.file().name().to_string())
                .collect();
            if including {
                cycle.push(self.source.file().name().to_string());
            }
            cycle.push(path.to_string_lossy().to_string());
            return Err(ResourceError::CircularInclude {
                cycle: cycle.join(" -> "),
                src: origin.named_source(),
                span: origin.span(),
                location: origin.clone(),
            }
            .into());
        }

        let text = self
            .fs
            .read_to_string(path)
            .map_err(|err| ResourceError::from_io(&path.to_string_lossy(), &err, origin))?;
        log::info!("loaded {}", path.display());
        let file = Arc::new(SourceFile::from_path(path.to_path_buf(), text));
        Ok(Source::from_file(file))
    }
}
