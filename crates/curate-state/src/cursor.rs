//! Closeable child-object cursor.
//!
//! Child enumeration in the content hierarchy hands out an [`ObjectCursor`].
//! The cursor owns whatever the backend needs to release once iteration is
//! over and releases it exactly once, either through [`ObjectCursor::close`]
//! or when the cursor is dropped on any other exit path.

use std::fmt;
use std::vec::IntoIter;

use crate::storage_traits::ContentObject;

type CloseHook = Box<dyn FnOnce() + Send>;

/// Iterator over content objects that releases its backing resources on drop.
pub struct ObjectCursor {
    objects: IntoIter<ContentObject>,
    on_close: Option<CloseHook>,
}

impl ObjectCursor {
    /// Cursor over an already-materialised list with nothing to release.
    pub fn new(objects: Vec<ContentObject>) -> Self {
        Self {
            objects: objects.into_iter(),
            on_close: None,
        }
    }

    /// Cursor that runs `hook` once when closed or dropped.
    pub fn with_close_hook(
        objects: Vec<ContentObject>,
        hook: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            objects: objects.into_iter(),
            on_close: Some(Box::new(hook)),
        }
    }

    /// Cursor with no objects.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of objects not yet yielded.
    pub fn remaining(&self) -> usize {
        self.objects.len()
    }

    /// Close explicitly. Equivalent to dropping the cursor.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl Iterator for ObjectCursor {
    type Item = ContentObject;

    fn next(&mut self) -> Option<Self::Item> {
        self.objects.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.objects.size_hint()
    }
}

impl Drop for ObjectCursor {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ObjectCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCursor")
            .field("remaining", &self.objects.len())
            .field("open", &self.on_close.is_some())
            .finish()
    }
}
