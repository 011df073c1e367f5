use crate::tick_error::ProduceError;

/// Lazy item sequence produced by a phase.
pub type ItemIter<W> = Box<dyn Iterator<Item = W>>;

pub(crate) type Producer<W> = Box<dyn FnOnce() -> Result<ItemIter<W>, ProduceError>>;

/// One indivisible unit of budgeted work.
///
/// Executing an item counts 1 against the drive budget. An item always runs to
/// completion once started; the scheduler only suspends between items.
pub trait WorkItem {
    fn execute(self);
}

impl<F: FnOnce()> WorkItem for F {
    fn execute(self) {
        self()
    }
}

/// A named, ordered group of work items.
///
/// The producer runs exactly once per cycle, at the moment execution reaches
/// the phase, so the items always reflect state at that point rather than at
/// cycle start.
pub struct Phase<W> {
    name: String,
    producer: Producer<W>,
}

impl<W: 'static> Phase<W> {
    pub fn new<F, I>(name: impl Into<String>, producer: F) -> Self
    where
        F: FnOnce() -> Result<I, ProduceError> + 'static,
        I: IntoIterator<Item = W>,
        I::IntoIter: 'static,
    {
        Self {
            name: name.into(),
            producer: Box::new(move || {
                producer().map(|items| Box::new(items.into_iter()) as ItemIter<W>)
            }),
        }
    }

    /// A phase over a fixed list of items. The list is moved in at build time.
    pub fn from_items(name: impl Into<String>, items: Vec<W>) -> Self {
        Self::new(name, move || Ok(items))
    }

    /// A phase that enumerates a set of sources when reached, then lazily
    /// expands each source into its own items, one source at a time.
    pub fn from_sources<F, S, G, I>(name: impl Into<String>, sources: F, expand: G) -> Self
    where
        F: FnOnce() -> Result<Vec<S>, ProduceError> + 'static,
        S: 'static,
        G: FnMut(S) -> I + 'static,
        I: IntoIterator<Item = W> + 'static,
        I::IntoIter: 'static,
    {
        Self::new(name, move || {
            let sources = sources()?;
            Ok(sources.into_iter().flat_map(expand))
        })
    }
}

impl<W> Phase<W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, Producer<W>) {
        (self.name, self.producer)
    }
}

impl<W> std::fmt::Debug for Phase<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase").field("name", &self.name).finish()
    }
}
