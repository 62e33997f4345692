//! Writable reactive signals.

use std::rc::Rc;

use crate::core::context::with_context;
use crate::core::types::{AnySource, CellInner, EqualsFn};
use crate::reactivity::tracking::{notify_write, track_read};

/// A reactive cell holding a value of type `T`.
///
/// Reading inside an effect or memo subscribes that computation; writing a
/// value that differs under the cell's equality function notifies
/// subscribers. Cloning the handle shares the cell.
#[derive(Clone)]
pub struct Signal<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self
    where
        T: PartialEq + 'static,
    {
        Self {
            inner: Rc::new(CellInner::new(value)),
        }
    }

    pub fn new_with_equals(value: T, equals: EqualsFn<T>) -> Self
    where
        T: 'static,
    {
        Self {
            inner: Rc::new(CellInner::new_with_equals(value, equals)),
        }
    }

    /// Current value (cloned). Registers a dependency when tracking.
    pub fn get(&self) -> T
    where
        T: Clone + 'static,
    {
        track_read(self.inner.clone() as Rc<dyn AnySource>);
        self.inner.get()
    }

    /// Borrow the current value without cloning. Registers a dependency
    /// when tracking.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R
    where
        T: 'static,
    {
        track_read(self.inner.clone() as Rc<dyn AnySource>);
        self.inner.with(f)
    }

    /// Replace the value. Returns true if it changed; an equal value
    /// notifies nobody.
    pub fn set(&self, value: T) -> bool
    where
        T: 'static,
    {
        let changed = self.inner.set(value);
        if changed {
            with_context(|ctx| {
                self.inner.set_write_version(ctx.increment_write_version());
            });
            notify_write(self.inner.clone() as Rc<dyn AnySource>);
        }
        changed
    }

    /// Mutate the value in place. Always notifies subscribers, since an
    /// in-place edit cannot be equality-checked.
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: 'static,
    {
        self.inner.mutate(f);
        with_context(|ctx| {
            self.inner.set_write_version(ctx.increment_write_version());
        });
        notify_write(self.inner.clone() as Rc<dyn AnySource>);
    }

    /// Type-erased handle into the graph.
    pub fn as_any_source(&self) -> Rc<dyn AnySource>
    where
        T: 'static,
    {
        self.inner.clone()
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("value", &self.inner.get()).finish()
    }
}

/// Create a signal.
pub fn signal<T>(value: T) -> Signal<T>
where
    T: PartialEq + 'static,
{
    Signal::new(value)
}

/// Create a signal with a custom equality function.
pub fn signal_with_equals<T>(value: T, equals: EqualsFn<T>) -> Signal<T>
where
    T: 'static,
{
    Signal::new_with_equals(value, equals)
}
