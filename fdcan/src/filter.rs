//! Message filters
use crate::config::{Filter, FilterType, RxFifo};
use crate::messageram::Word;
use embedded_can::{ExtendedId, StandardId};

/// 11-bit filter in the peripheral's representation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FilterStandardId(pub u32);
/// 29-bit filter in the peripheral's representation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FilterExtendedId(pub [u32; 2]);

/// Filter element configurations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// The element is disabled
    Disable,
    /// Store in RX FIFO 0 if filter matches
    StoreFifo0,
    /// Store in RX FIFO 1 if filter matches
    StoreFifo1,
}

impl From<RxFifo> for Action {
    fn from(fifo: RxFifo) -> Self {
        match fifo {
            RxFifo::Fifo0 => Action::StoreFifo0,
            RxFifo::Fifo1 => Action::StoreFifo1,
        }
    }
}

impl From<Action> for u32 {
    fn from(val: Action) -> Self {
        match val {
            Action::Disable => 0x0,
            Action::StoreFifo0 => 0x1,
            Action::StoreFifo1 => 0x2,
        }
    }
}

/// A configured filter together with the FIFO of its receive object
#[derive(Copy, Clone, Debug)]
pub struct Element<'a> {
    /// Filter values
    pub filter: &'a Filter,
    /// Where matching frames are stored
    pub fifo: RxFifo,
}

fn filter_type(t: FilterType) -> u32 {
    match t {
        FilterType::Range => 0,
        FilterType::Dual => 1,
        FilterType::Classic => 2,
        FilterType::Disabled => 3,
    }
}

impl From<Element<'_>> for FilterStandardId {
    fn from(val: Element<'_>) -> Self {
        let mask = StandardId::MAX.as_raw() as u32;
        let id1 = val.filter.code & mask;
        let id2 = val.filter.mask & mask;
        let action: u32 = match val.filter.filter_type {
            FilterType::Disabled => Action::Disable,
            _ => val.fifo.into(),
        }
        .into();

        FilterStandardId(id2 | id1 << 16 | action << 27 | filter_type(val.filter.filter_type) << 30)
    }
}

impl From<Element<'_>> for FilterExtendedId {
    fn from(val: Element<'_>) -> Self {
        let mask = ExtendedId::MAX.as_raw();
        let id1 = val.filter.code & mask;
        let id2 = val.filter.mask & mask;
        match val.filter.filter_type {
            // EFT 3 is a range filter on this peripheral, a zero EFEC disables
            FilterType::Disabled => FilterExtendedId([id1, id2]),
            t => {
                let action: u32 = Action::from(val.fifo).into();
                FilterExtendedId([action << 29 | id1, filter_type(t) << 30 | id2])
            }
        }
    }
}

/// Filter list slot in message RAM
pub trait Slot {
    /// Element stored in the slot
    type Element: Copy;
    /// Writes `element` into the slot
    fn store(&self, element: Self::Element);
}

impl Slot for Word {
    type Element = FilterStandardId;

    fn store(&self, element: FilterStandardId) {
        self.set(element.0)
    }
}

impl Slot for [Word; 2] {
    type Element = FilterExtendedId;

    fn store(&self, element: FilterExtendedId) {
        self[0].set(element.0[0]);
        self[1].set(element.0[1]);
    }
}

/// Acceptance filters for incoming messages
pub struct Filters<'a, S> {
    memory: &'a [S],
    len: usize,
}

impl<'a, S: Slot> Filters<'a, S> {
    /// Starts an empty list over `memory`. The memory is expected to be
    /// zeroed, which disables every element.
    pub fn new(memory: &'a [S]) -> Self {
        Self { memory, len: 0 }
    }

    /// Appends a `filter` to the back of the list. Returns the assigned index
    /// if successful. Returns back the `filter` if the list is full.
    pub fn push<F: Copy + Into<S::Element>>(&mut self, filter: F) -> Result<usize, F> {
        let index = self.len;
        let slot = self.memory.get(index).ok_or(filter)?;
        slot.store(filter.into());
        self.len += 1;
        Ok(index)
    }

    /// Number of installed elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if nothing was installed
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::IdKind;
    use crate::messageram::MessageRam;

    fn filter(filter_type: FilterType, code: u32, mask: u32) -> Filter {
        Filter {
            code,
            mask,
            filter_type,
            id_kind: IdKind::Standard,
        }
    }

    #[test]
    fn standard_element_fields() {
        let f = filter(FilterType::Classic, 0x123, 0x7f0);
        let e = FilterStandardId::from(Element {
            filter: &f,
            fifo: RxFifo::Fifo1,
        });
        assert_eq!(e.0, 0x7f0 | 0x123 << 16 | 2 << 27 | 2 << 30);

        let f = filter(FilterType::Range, 0x10, 0x20);
        let e = FilterStandardId::from(Element {
            filter: &f,
            fifo: RxFifo::Fifo0,
        });
        assert_eq!(e.0, 0x20 | 0x10 << 16 | 1 << 27);
    }

    #[test]
    fn disabled_standard_element() {
        let f = filter(FilterType::Disabled, 0x1, 0x2);
        let e = FilterStandardId::from(Element {
            filter: &f,
            fifo: RxFifo::Fifo0,
        });
        assert_eq!(e.0 >> 27 & 0x7, 0);
        assert_eq!(e.0 >> 30, 3);
    }

    #[test]
    fn extended_element_fields() {
        let f = Filter {
            id_kind: IdKind::Extended,
            ..filter(FilterType::Dual, 0x1fff_ffff, 0x0123_4567)
        };
        let e = FilterExtendedId::from(Element {
            filter: &f,
            fifo: RxFifo::Fifo0,
        });
        assert_eq!(e.0, [1 << 29 | 0x1fff_ffff, 1 << 30 | 0x0123_4567]);

        let f = Filter {
            filter_type: FilterType::Disabled,
            ..f
        };
        let e = FilterExtendedId::from(Element {
            filter: &f,
            fifo: RxFifo::Fifo1,
        });
        assert_eq!(e.0[0] >> 29, 0);
    }

    #[test]
    fn push_stops_at_capacity() {
        let ram = MessageRam::new();
        let f = filter(FilterType::Dual, 0x1, 0x2);
        let element = Element {
            filter: &f,
            fifo: RxFifo::Fifo0,
        };
        let mut list = Filters::new(&ram.filters_extended[..2]);
        assert_eq!(list.push(element).ok(), Some(0));
        assert_eq!(list.push(element).ok(), Some(1));
        assert!(list.push(element).is_err());
        assert_eq!(list.len(), 2);
        assert_ne!(ram.filters_extended[1][0].get(), 0);
        assert_eq!(ram.filters_extended[2][0].get(), 0);
    }
}
