use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};
use foldhash::{HashMap, HashMapExt};

use crate::constants::ERR_POISONED_LOCK;
use crate::{Id, NamingConvention, Statistic};

/// How an exporter turns a meter identity into text.
///
/// Renders the parts of the output that depend only on the identity and the naming
/// convention (e.g. the sanitized name and the tag block). The result is cached by
/// [`NamingCache`].
pub trait RenderRules: Send + Sync + 'static {
    /// The rendered parts.
    type Fragments: Send + Sync + 'static;

    /// Renders the convention-dependent fragments of a meter identity.
    fn render(&self, id: &Id, convention: &dyn NamingConvention) -> Self::Fragments;
}

/// Second rendering stage for exporters that write one piece of text per statistic.
///
/// Combines the fragments with a statistic into the final text (e.g. a line prefix with a
/// `statistic` tag), memoized per statistic by [`NamingCache::text()`].
pub trait StatisticRules: RenderRules {
    /// Renders the final text for one statistic (or for no statistic, for meters that
    /// only produce a single value).
    fn render_statistic(&self, fragments: &Self::Fragments, statistic: Option<Statistic>)
    -> String;
}

/// Caches the rendered text of one meter for one exporter.
///
/// The cached text stays valid for as long as the exporter keeps rendering with the same
/// naming convention instance. Conventions are compared by identity (`Arc::ptr_eq`), not by
/// value: installing a new convention instance invalidates the cache even if it renders
/// the same way.
///
/// Reads are lock-free. Only the first render after a convention change takes a lock,
/// and concurrent renders for the same change compute the fragments only once.
pub struct NamingCache<R: RenderRules> {
    id: Arc<Id>,
    rules: Arc<R>,

    current: ArcSwapOption<Rendered<R::Fragments>>,

    // Serializes recomputation after a convention change.
    lock: Mutex<()>,
}

impl<R: RenderRules> NamingCache<R> {
    /// Creates an empty cache for the given meter identity.
    #[must_use]
    pub fn new(id: Arc<Id>, rules: Arc<R>) -> Self {
        Self {
            id,
            rules,
            current: ArcSwapOption::const_empty(),
            lock: Mutex::new(()),
        }
    }

    /// The identity whose text is cached.
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the fragments rendered with `convention`, rendering them if the cache holds
    /// fragments of a different convention instance or none at all.
    pub fn render(&self, convention: &Arc<dyn NamingConvention>) -> Arc<Rendered<R::Fragments>> {
        if let Some(rendered) = self.cached(convention) {
            return rendered;
        }

        let _guard = self.lock.lock().expect(ERR_POISONED_LOCK);

        // Someone else may have rendered with the same convention while we waited.
        if let Some(rendered) = self.cached(convention) {
            return rendered;
        }

        let rendered = Arc::new(Rendered {
            convention: Arc::clone(convention),
            fragments: self.rules.render(&self.id, convention.as_ref()),
            by_statistic: ArcSwap::from_pointee(HashMap::new()),
            lock: Mutex::new(()),
        });

        self.current.store(Some(Arc::clone(&rendered)));

        rendered
    }

    fn cached(
        &self,
        convention: &Arc<dyn NamingConvention>,
    ) -> Option<Arc<Rendered<R::Fragments>>> {
        let current = self.current.load();

        match &*current {
            Some(rendered) if Arc::ptr_eq(&rendered.convention, convention) => {
                Some(Arc::clone(rendered))
            }
            _ => None,
        }
    }
}

impl<R: StatisticRules> NamingCache<R> {
    /// Returns the final text for `statistic` rendered with `convention`.
    pub fn text(
        &self,
        convention: &Arc<dyn NamingConvention>,
        statistic: Option<Statistic>,
    ) -> Arc<str> {
        self.render(convention).for_statistic(statistic, |fragments| {
            self.rules.render_statistic(fragments, statistic)
        })
    }
}

impl<R: RenderRules> Debug for NamingCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingCache")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// The text of one meter rendered with one naming convention instance.
pub struct Rendered<F> {
    convention: Arc<dyn NamingConvention>,
    fragments: F,

    // Copy-on-write: readers load a snapshot, writers swap in an extended copy.
    by_statistic: ArcSwap<HashMap<Option<Statistic>, Arc<str>>>,
    lock: Mutex<()>,
}

impl<F> Rendered<F> {
    /// The fragments rendered by [`RenderRules::render`].
    #[must_use]
    pub fn fragments(&self) -> &F {
        &self.fragments
    }

    /// Returns the memoized text for `statistic`, computing it with `render` on first use.
    pub fn for_statistic(
        &self,
        statistic: Option<Statistic>,
        render: impl FnOnce(&F) -> String,
    ) -> Arc<str> {
        if let Some(text) = self.by_statistic.load().get(&statistic) {
            return Arc::clone(text);
        }

        let _guard = self.lock.lock().expect(ERR_POISONED_LOCK);

        let current = self.by_statistic.load_full();

        if let Some(text) = current.get(&statistic) {
            return Arc::clone(text);
        }

        let text: Arc<str> = Arc::from(render(&self.fragments));

        let mut extended = HashMap::clone(&current);
        extended.insert(statistic, Arc::clone(&text));
        self.by_statistic.store(Arc::new(extended));

        text
    }
}

impl<F> Debug for Rendered<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rendered")
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}
