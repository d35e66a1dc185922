//! Stream sources

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mapper::{Shape, Wrapper};
use crate::record::Record;
use crate::table::Table;

use super::{Lazy, Pull, Stream};

/// Stateless stream over a function of the index
struct FnStream<F> {
    f: Arc<F>,
}

impl<T, F> Stream<T> for FnStream<F>
where
    F: Fn(u64) -> Result<Pull<T>> + Send + Sync,
{
    fn pull(&self, index: u64) -> Result<Pull<T>> {
        (self.f)(index)
    }
}

/// Stream over shared, already built items
struct ItemStream<T> {
    items: Arc<Vec<T>>,
}

impl<T: Clone + Send + Sync> Stream<T> for ItemStream<T> {
    fn pull(&self, index: u64) -> Result<Pull<T>> {
        let item = usize::try_from(index).ok().and_then(|i| self.items.get(i));
        Ok(item.map_or(Pull::End, |t| Pull::Row(t.clone())))
    }
}

impl<T: Send + 'static> Lazy<T> {
    /// Stream computed from the index alone
    ///
    /// `f` must return [`Pull::End`] for every index past the last row.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u64) -> Result<Pull<T>> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Lazy::new(move || Box::new(FnStream { f: Arc::clone(&f) }))
    }

    /// Stream that fails at index 0 with an error built by `make`
    pub fn from_error<F>(make: F) -> Self
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        Lazy::from_fn(move |index| {
            if index == 0 {
                Err(make())
            } else {
                Ok(Pull::End)
            }
        })
    }

    /// Stream with no rows
    pub fn empty() -> Self {
        Lazy::from_fn(|_| Ok(Pull::End))
    }
}

impl<T: Clone + Send + Sync + 'static> Lazy<T> {
    /// Stream over in-memory items
    pub fn from_items(items: Vec<T>) -> Self {
        let items = Arc::new(items);
        Lazy::new(move || {
            Box::new(ItemStream {
                items: Arc::clone(&items),
            })
        })
    }
}

impl Lazy<Record> {
    /// Stream over in-memory records
    pub fn from_records(records: Vec<Record>) -> Self {
        Lazy::from_items(records)
    }

    /// Stream over shape values wrapped into records
    pub fn from_shapes<S: Shape>(shapes: Vec<S>) -> Self {
        let shapes = Arc::new(shapes);
        Lazy::new(move || {
            let shapes = Arc::clone(&shapes);
            let wrapper = Wrapper::<S>::new();
            Box::new(FnStream {
                f: Arc::new(move |index: u64| -> Result<Pull<Record>> {
                    let shape = usize::try_from(index).ok().and_then(|i| shapes.get(i));
                    Ok(shape.map_or(Pull::End, |s| Pull::Row(wrapper.wrap(s))))
                }),
            })
        })
    }
}

impl Table {
    /// Stream over the rows of this table
    pub fn lazy(&self) -> Lazy<Record> {
        let table = Arc::new(self.clone());
        Lazy::from_fn(move |index| match usize::try_from(index) {
            Ok(i) if i < table.len() => table.row(i).map(Pull::Row),
            _ => Ok(Pull::End),
        })
    }
}
