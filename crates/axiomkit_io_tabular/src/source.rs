//! Row sources: a finite sequence or a batch-pulling cursor behind one pull contract.

use std::collections::VecDeque;

use log::debug;

use crate::conf::N_SIZE_BATCH_DEFAULT;
use crate::spec::{BoxError, SheetError};

////////////////////////////////////////////////////////////////////////////////
// #region CursorContract

/// External cursor supplying items in bounded batches.
///
/// `Ok(None)` or an empty batch ends the stream.
pub trait ChunkCursor<T> {
    fn pull_next(&mut self, size_batch: usize) -> Result<Option<Vec<T>>, BoxError>;
}

impl<T, F> ChunkCursor<T> for F
where
    F: FnMut(usize) -> Result<Option<Vec<T>>, BoxError>,
{
    fn pull_next(&mut self, size_batch: usize) -> Result<Option<Vec<T>>, BoxError> {
        self(size_batch)
    }
}

/// Cursor paging through an owned vector, `size_batch` items per pull.
#[derive(Debug, Clone)]
pub struct VecCursor<T> {
    items: VecDeque<T>,
}

impl<T> VecCursor<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

impl<T> ChunkCursor<T> for VecCursor<T> {
    fn pull_next(&mut self, size_batch: usize) -> Result<Option<Vec<T>>, BoxError> {
        if self.items.is_empty() {
            return Ok(None);
        }
        let n_take = usize::min(size_batch, self.items.len());
        Ok(Some(self.items.drain(..n_take).collect()))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowSource

/// Input rows of one write call.
pub enum EnumRowSource<'a, T> {
    /// Fully materialized items.
    Finite(Vec<T>),
    /// Items pulled lazily in batches of `size_batch`.
    Chunked {
        cursor: Box<dyn ChunkCursor<T> + 'a>,
        size_batch: usize,
    },
}

impl<'a, T> EnumRowSource<'a, T> {
    pub fn finite(items: impl IntoIterator<Item = T>) -> Self {
        Self::Finite(items.into_iter().collect())
    }

    /// Chunked source with the default batch size.
    pub fn chunked(cursor: impl ChunkCursor<T> + 'a) -> Self {
        Self::chunked_with_batch_size(cursor, N_SIZE_BATCH_DEFAULT)
    }

    pub fn chunked_with_batch_size(cursor: impl ChunkCursor<T> + 'a, size_batch: usize) -> Self {
        Self::Chunked {
            cursor: Box::new(cursor),
            size_batch,
        }
    }

    /// Ordered `(index, item)` stream; `index` counts logical items from zero.
    pub fn into_items(self) -> Result<SourceItems<'a, T>, SheetError> {
        let inner = match self {
            Self::Finite(items) => EnumSourceInner::Finite(items.into_iter()),
            Self::Chunked { cursor, size_batch } => {
                if size_batch == 0 {
                    return Err(SheetError::InvalidOptions(
                        "size_batch must be >= 1.".to_string(),
                    ));
                }
                EnumSourceInner::Chunked {
                    cursor,
                    size_batch,
                    buffer: VecDeque::new(),
                    n_batches: 0,
                    if_exhausted: false,
                }
            }
        };
        Ok(SourceItems {
            inner,
            n_idx_next: 0,
        })
    }
}

impl<T> From<Vec<T>> for EnumRowSource<'_, T> {
    fn from(items: Vec<T>) -> Self {
        Self::Finite(items)
    }
}

enum EnumSourceInner<'a, T> {
    Finite(std::vec::IntoIter<T>),
    Chunked {
        cursor: Box<dyn ChunkCursor<T> + 'a>,
        size_batch: usize,
        buffer: VecDeque<T>,
        n_batches: usize,
        if_exhausted: bool,
    },
}

/// Iterator returned by [`EnumRowSource::into_items`].
///
/// Batch boundaries are invisible: item `k` always carries index `k`.
pub struct SourceItems<'a, T> {
    inner: EnumSourceInner<'a, T>,
    n_idx_next: usize,
}

impl<T> Iterator for SourceItems<'_, T> {
    type Item = Result<(usize, T), SheetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match &mut self.inner {
            EnumSourceInner::Finite(items) => items.next()?,
            EnumSourceInner::Chunked {
                cursor,
                size_batch,
                buffer,
                n_batches,
                if_exhausted,
            } => {
                while buffer.is_empty() {
                    if *if_exhausted {
                        return None;
                    }
                    match cursor.pull_next(*size_batch) {
                        Ok(Some(batch)) if !batch.is_empty() => {
                            *n_batches += 1;
                            debug!("Pulled batch #{} with {} item(s)", n_batches, batch.len());
                            buffer.extend(batch);
                        }
                        Ok(_) => *if_exhausted = true,
                        Err(err) => {
                            *if_exhausted = true;
                            return Some(Err(SheetError::Source(err)));
                        }
                    }
                }
                buffer.pop_front()?
            }
        };

        let n_idx = self.n_idx_next;
        self.n_idx_next += 1;
        Some(Ok((n_idx, item)))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
