use crate::data_bin::DataBin;
use crate::entry::TreeEntry;

/// The state of one leaf-level slot.
///
/// A slot covers a contiguous sub-range of the tree's domain and is either
/// not fetched yet (`Unloaded`), fetched and known to hold nothing (`Empty`),
/// or populated (`Loaded`). The distinction between the first two is what
/// makes the tree a cache rather than a plain index.
#[derive(Debug)]
pub enum Slot<E: TreeEntry> {
    /// No data has been fetched for this sub-range.
    Unloaded,
    /// The sub-range is known to contain no intervals.
    Empty,
    /// A populated leaf bin.
    Loaded(DataBin<E>),
}

/// The empty-slot variant installed where no populated bin lives, e.g. for
/// removed data. `local_only` trees always fill with [`Filler::Empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filler {
    Unloaded,
    Empty,
}

impl<E: TreeEntry> Slot<E> {
    pub fn filler(filler: Filler) -> Self {
        match filler {
            Filler::Unloaded => Slot::Unloaded,
            Filler::Empty => Slot::Empty,
        }
    }

    pub fn is_unloaded(&self) -> bool {
        matches!(self, Slot::Unloaded)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Slot::Loaded(_))
    }

    pub fn as_bin(&self) -> Option<&DataBin<E>> {
        match self {
            Slot::Loaded(bin) => Some(bin),
            _ => None,
        }
    }

    pub fn as_bin_mut(&mut self) -> Option<&mut DataBin<E>> {
        match self {
            Slot::Loaded(bin) => Some(bin),
            _ => None,
        }
    }

    /// Whether two slots are the same filler variant (`Loaded` never matches).
    pub fn same_filler(&self, other: &Slot<E>) -> bool {
        matches!(
            (self, other),
            (Slot::Unloaded, Slot::Unloaded) | (Slot::Empty, Slot::Empty)
        )
    }
}
