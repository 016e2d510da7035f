//! Ordered top-level peripheral collection.

use crate::description::PeripheralDesc;
use crate::node::{NodeArena, NodeId, NodeKind};
use std::cmp::Ordering;

/// Owns the node arena and the display order of its peripherals.
///
/// The order is always pinned peripherals first, then by name. Peripherals
/// with the same name keep their declaration order, however often they are
/// pinned and unpinned.
#[derive(Debug, Default)]
pub struct PeripheralCollection {
    arena: NodeArena,
    order: Vec<NodeId>,
}

impl PeripheralCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly built tree. Returns the new generation.
    pub fn replace(&mut self, peripherals: Vec<PeripheralDesc>) -> u64 {
        let generation = self.arena.generation() + 1;
        self.arena = NodeArena::build(generation, peripherals);
        self.order = self.arena.roots();
        self.sort_in_place();
        generation
    }

    /// Drop every node. Outstanding handles become stale.
    pub fn clear(&mut self) {
        let generation = self.arena.generation() + 1;
        self.arena = NodeArena::empty(generation);
        self.order.clear();
    }

    pub fn sort_in_place(&mut self) {
        let arena = &self.arena;
        self.order.sort_by(|a, b| compare(arena, *a, *b));
    }

    /// Flip the pin of the peripheral owning `node` and re-sort.
    /// Returns the new pin state, or `None` when `node` has no peripheral.
    pub fn toggle_pin(&mut self, node: NodeId) -> Option<bool> {
        let peripheral = self.arena.peripheral_of(node)?;
        let pinned = match self.arena.get_mut(peripheral).map(|n| &mut n.kind) {
            Some(NodeKind::Peripheral(data)) => {
                data.pinned = !data.pinned;
                data.pinned
            }
            _ => return None,
        };
        self.sort_in_place();
        Some(pinned)
    }

    /// Peripherals in display order.
    pub fn peripherals(&self) -> &[NodeId] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub const fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    pub const fn generation(&self) -> u64 {
        self.arena.generation()
    }
}

fn compare(arena: &NodeArena, a: NodeId, b: NodeId) -> Ordering {
    let pinned_a = arena.is_pinned(a);
    let pinned_b = arena.is_pinned(b);
    pinned_b.cmp(&pinned_a).then_with(|| {
        let name_a = arena.get(a).map(|n| n.name.as_str());
        let name_b = arena.get(b).map(|n| n.name.as_str());
        name_a.cmp(&name_b)
    })
    // Arena indices follow declaration order.
    .then_with(|| a.cmp(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peripheral(name: &str, base: u64) -> PeripheralDesc {
        PeripheralDesc {
            name: name.to_string(),
            base_address: base,
            description: None,
            group_name: None,
            registers: Vec::new(),
        }
    }

    fn names(c: &PeripheralCollection) -> Vec<(String, u64)> {
        c.peripherals()
            .iter()
            .map(|&id| {
                let node = c.arena().get(id).unwrap();
                let base = match &node.kind {
                    NodeKind::Peripheral(p) => p.base_address,
                    _ => unreachable!(),
                };
                (node.name.clone(), base)
            })
            .collect()
    }

    fn is_sorted(c: &PeripheralCollection) -> bool {
        c.peripherals()
            .windows(2)
            .all(|w| compare(c.arena(), w[0], w[1]) != Ordering::Greater)
    }

    #[test]
    fn test_replace_sorts_by_name() {
        let mut c = PeripheralCollection::new();
        c.replace(vec![
            peripheral("USART1", 1),
            peripheral("ADC", 2),
            peripheral("GPIOA", 3),
        ]);
        let order: Vec<_> = names(&c).into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, ["ADC", "GPIOA", "USART1"]);
    }

    #[test]
    fn test_name_order_is_case_sensitive() {
        let mut c = PeripheralCollection::new();
        c.replace(vec![peripheral("adc", 1), peripheral("ADC", 2), peripheral("Bkp", 3)]);
        let order: Vec<_> = names(&c).into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, ["ADC", "Bkp", "adc"]);
    }

    #[test]
    fn test_toggle_pin_moves_to_front_and_back() {
        let mut c = PeripheralCollection::new();
        c.replace(vec![
            peripheral("ADC", 1),
            peripheral("GPIOA", 2),
            peripheral("USART1", 3),
        ]);
        let usart = c.peripherals()[2];

        assert_eq!(c.toggle_pin(usart), Some(true));
        assert_eq!(c.peripherals()[0], usart);

        assert_eq!(c.toggle_pin(usart), Some(false));
        assert_eq!(c.peripherals()[2], usart);
    }

    #[test]
    fn test_duplicate_names_keep_declaration_order() {
        let mut c = PeripheralCollection::new();
        c.replace(vec![
            peripheral("TIM", 10),
            peripheral("ADC", 1),
            peripheral("TIM", 20),
            peripheral("TIM", 30),
        ]);
        let ids = c.peripherals().to_vec();
        // Pin and unpin the ADC a few times; TIM order must not change.
        for _ in 0..5 {
            c.toggle_pin(ids[0]);
            let tims: Vec<u64> = names(&c)
                .into_iter()
                .filter(|(n, _)| n == "TIM")
                .map(|(_, b)| b)
                .collect();
            assert_eq!(tims, [10, 20, 30]);
            assert!(is_sorted(&c));
        }
    }

    #[test]
    fn test_any_toggle_sequence_stays_sorted() {
        let mut c = PeripheralCollection::new();
        let descs: Vec<_> = ["SPI2", "SPI1", "I2C", "DMA", "RCC", "SPI1", "CAN"]
            .iter()
            .enumerate()
            .map(|(i, n)| peripheral(n, i as u64))
            .collect();
        c.replace(descs);
        let ids = c.peripherals().to_vec();

        // Deterministic pseudo-random toggle sequence.
        let mut seed = 0x2545_F491_u32;
        for _ in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let id = ids[seed as usize % ids.len()];
            c.toggle_pin(id);
            assert!(is_sorted(&c));

            let pinned: Vec<bool> = c
                .peripherals()
                .iter()
                .map(|&id| c.arena().is_pinned(id))
                .collect();
            let first_unpinned = pinned.iter().position(|p| !p).unwrap_or(pinned.len());
            assert!(pinned[first_unpinned..].iter().all(|p| !p));

            let spi1: Vec<u64> = names(&c)
                .into_iter()
                .filter(|(n, _)| n == "SPI1")
                .map(|(_, b)| b)
                .collect();
            let spi1_pinned: Vec<bool> = c
                .peripherals()
                .iter()
                .filter(|&&id| c.arena().get(id).unwrap().name == "SPI1")
                .map(|&id| c.arena().is_pinned(id))
                .collect();
            if spi1_pinned[0] == spi1_pinned[1] {
                assert_eq!(spi1, [1, 5]);
            }
        }
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut c = PeripheralCollection::new();
        c.replace(vec![peripheral("ADC", 1)]);
        let adc = c.peripherals()[0];
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.toggle_pin(adc), None);
    }
}
