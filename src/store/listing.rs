use std::collections::VecDeque;

use super::error::Error;
use super::Store;
use crate::core::models::Keyed;

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Fetches one page of dependents of `application`, ordered by key and
/// starting strictly after `after`.
pub type PageFn<S, R> =
    fn(&S, &<S as Store>::Key, Option<&<S as Store>::Key>, usize) -> Result<Vec<R>, Error>;

/// Lazy sequence of the records belonging to one application.
///
/// Nothing is read until the first call to `next`, after which records are
/// pulled a page at a time using the last seen key as the cursor. Records
/// written while iterating are picked up if their key sorts after the cursor.
/// An error ends the sequence; [`Listing::rewind`] starts it over.
pub struct Listing<'s, S: Store, R> {
    store: &'s S,
    application: S::Key,
    fetch: PageFn<S, R>,
    page_size: usize,
    after: Option<S::Key>,
    buffer: VecDeque<R>,
    done: bool,
}

impl<'s, S: Store, R> Listing<'s, S, R> {
    pub fn new(store: &'s S, application: S::Key, fetch: PageFn<S, R>) -> Self {
        Self {
            store,
            application,
            fetch,
            page_size: DEFAULT_PAGE_SIZE,
            after: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn application(&self) -> &S::Key {
        &self.application
    }

    pub fn rewind(&mut self) {
        self.after = None;
        self.buffer.clear();
        self.done = false;
    }
}

impl<'s, S: Store, R: Keyed<S::Key>> Iterator for Listing<'s, S, R> {
    type Item = Result<R, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match (self.fetch)(
                self.store,
                &self.application,
                self.after.as_ref(),
                self.page_size,
            ) {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.done = true;
                    }
                    if let Some(last) = page.last() {
                        self.after = Some(last.key().clone());
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}
