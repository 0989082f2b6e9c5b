//! Paginated listings.
//!
//! Both collaborators return listings one page at a time. Callers use
//! [`read_all`] (or [`read_listing`] for target listings) to keep fetching
//! until the collaborator reports exhaustion.

use crate::catalog::TargetRecord;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest number of items requested per page.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Position and size of a requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Number of items to skip.
    pub offset: usize,
    /// Maximum number of items to return.
    pub size: usize,
}

impl PageRequest {
    /// Request the first page. The size is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn first(size: usize) -> Self {
        Self {
            offset: 0,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Request the page following this one.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.size),
            size: self.size,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Whether further pages exist.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A page that ends the listing.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
        }
    }

    /// A page followed by more pages.
    pub fn more(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: true,
        }
    }

    /// An empty final page.
    pub fn empty() -> Self {
        Self::last(Vec::new())
    }
}

impl<T: Clone> Page<T> {
    /// Cut the requested page out of a complete listing.
    pub fn slice(all: &[T], request: PageRequest) -> Self {
        let start = request.offset.min(all.len());
        let end = request.offset.saturating_add(request.size).min(all.len());
        Self {
            items: all[start..end].to_vec(),
            has_more: end < all.len(),
        }
    }
}

/// One page of a target listing.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingPage {
    /// The store has never listed anything for this scope.
    NeverListed,
    /// A page of records.
    Page(Page<TargetRecord>),
}

/// A complete target listing for one scope.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetListing {
    /// The store has never listed anything for this scope (first sync, or a
    /// rebuild after losing the target snapshot). Never causes deletes.
    NeverListed,
    /// The scope was listed; the vector may be empty.
    Listed(Vec<TargetRecord>),
}

impl TargetListing {
    /// Records in the listing (empty when never listed).
    pub fn records(&self) -> &[TargetRecord] {
        match self {
            TargetListing::NeverListed => &[],
            TargetListing::Listed(records) => records,
        }
    }

    /// Whether this is the never-listed marker.
    pub fn is_never_listed(&self) -> bool {
        matches!(self, TargetListing::NeverListed)
    }
}

/// Fetch pages until the listing is exhausted.
///
/// An empty page also ends the listing, so a collaborator that keeps
/// reporting `has_more` without returning items cannot loop forever.
pub fn read_all<T, E, F>(page_size: usize, mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Result<Page<T>, E>,
{
    let mut request = PageRequest::first(page_size);
    let mut items = Vec::new();

    loop {
        let page = fetch(request)?;
        let exhausted = !page.has_more || page.items.is_empty();
        items.extend(page.items);
        if exhausted {
            return Ok(items);
        }
        request = request.next();
    }
}

/// Fetch a complete target listing.
///
/// The never-listed marker is only meaningful on the first page; on later
/// pages it ends the listing.
pub fn read_listing<E, F>(page_size: usize, mut fetch: F) -> Result<TargetListing, E>
where
    F: FnMut(PageRequest) -> Result<ListingPage, E>,
{
    let mut request = PageRequest::first(page_size);
    let mut records = Vec::new();

    loop {
        match fetch(request)? {
            ListingPage::NeverListed if request.offset == 0 => {
                return Ok(TargetListing::NeverListed);
            }
            ListingPage::NeverListed => return Ok(TargetListing::Listed(records)),
            ListingPage::Page(page) => {
                let exhausted = !page.has_more || page.items.is_empty();
                records.extend(page.items);
                if exhausted {
                    return Ok(TargetListing::Listed(records));
                }
            }
        }
        request = request.next();
    }
}
