use crate::error::Fault;

/// Growable, zero-filled integer storage. Never shrinks.
#[derive(Debug, Clone, Default)]
pub struct MemoryBank {
    cells: Vec<i64>,
    limit: Option<usize>,
}

impl MemoryBank {
    pub fn new(initial: &[i64]) -> Self {
        Self {
            cells: initial.to_vec(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[inline]
    fn index(&self, addr: i64) -> Result<usize, Fault> {
        if addr < 0 {
            return Err(Fault::AddressNegative(addr));
        }
        let idx = usize::try_from(addr).map_err(|_| Fault::MemoryLimit {
            addr,
            limit: usize::MAX,
        })?;
        if let Some(limit) = self.limit {
            if idx >= limit {
                return Err(Fault::MemoryLimit { addr, limit });
            }
        }
        Ok(idx)
    }

    /// Grows to cover `idx`. An allocation the host cannot satisfy is a
    /// `MemoryLimit` fault, never an abort.
    #[inline]
    fn ensure(&mut self, addr: i64, idx: usize) -> Result<(), Fault> {
        if idx >= self.cells.len() {
            let limit = self.cells.len();
            let additional = idx
                .checked_add(1)
                .map(|wanted| wanted - limit)
                .ok_or(Fault::MemoryLimit { addr, limit })?;
            self.cells
                .try_reserve(additional)
                .map_err(|_| Fault::MemoryLimit { addr, limit })?;
            self.cells.resize(idx + 1, 0);
        }
        Ok(())
    }

    pub fn get(&mut self, addr: i64) -> Result<i64, Fault> {
        let idx = self.index(addr)?;
        self.ensure(addr, idx)?;
        Ok(self.cells[idx])
    }

    pub fn set(&mut self, addr: i64, value: i64) -> Result<(), Fault> {
        let idx = self.index(addr)?;
        self.ensure(addr, idx)?;
        self.cells[idx] = value;
        Ok(())
    }

    /// Reads without growing; cells past the end read as zero.
    pub fn peek(&self, addr: i64) -> Result<i64, Fault> {
        let idx = self.index(addr)?;
        Ok(self.cells.get(idx).copied().unwrap_or(0))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::seq::SliceRandom;

    #[test]
    fn reads_past_end_are_zero_and_grow() {
        let mut mem = MemoryBank::new(&[1, 2, 3]);
        assert_eq!(mem.get(10).unwrap(), 0);
        assert_eq!(mem.len(), 11);
        assert_eq!(mem.get(2).unwrap(), 3);
    }

    #[test]
    fn far_write_then_read() {
        let mut mem = MemoryBank::new(&[99]);
        mem.set(100_000, 42).unwrap();
        assert_eq!(mem.get(100_000).unwrap(), 42);
        assert_eq!(mem.get(99_999).unwrap(), 0);
        assert_eq!(mem.len(), 100_001);
    }

    #[test]
    fn peek_does_not_grow() {
        let mut mem = MemoryBank::new(&[7]);
        assert_eq!(mem.peek(0).unwrap(), 7);
        assert_eq!(mem.peek(500).unwrap(), 0);
        assert_eq!(mem.len(), 1);
        mem.set(3, 9).unwrap();
        assert_eq!(mem.peek(3).unwrap(), 9);
    }

    #[test]
    fn never_shrinks() {
        let mut mem = MemoryBank::new(&[]);
        mem.set(50, 1).unwrap();
        mem.get(3).unwrap();
        assert_eq!(mem.len(), 51);
    }

    #[test]
    fn negative_address_fails_fast() {
        let mut mem = MemoryBank::new(&[0; 4]);
        assert_eq!(mem.get(-1), Err(Fault::AddressNegative(-1)));
        assert_eq!(mem.set(-7, 5), Err(Fault::AddressNegative(-7)));
        assert_eq!(mem.len(), 4);
    }

    #[test]
    fn limit_is_enforced_only_when_configured() {
        let mut mem = MemoryBank::new(&[0; 4]).with_limit(Some(16));
        assert!(mem.set(15, 1).is_ok());
        assert_eq!(
            mem.set(16, 1),
            Err(Fault::MemoryLimit { addr: 16, limit: 16 })
        );
    }

    #[test]
    fn unallocatable_growth_is_a_fault() {
        let addr = 1_000_000_000_000_000;
        let mut mem = MemoryBank::new(&[1, 2]);
        assert_eq!(mem.set(addr, 1), Err(Fault::MemoryLimit { addr, limit: 2 }));
        assert_eq!(mem.get(i64::MAX), Err(Fault::MemoryLimit { addr: i64::MAX, limit: 2 }));
        assert_eq!(mem.as_slice(), &[1, 2]);
    }

    #[test]
    fn zero_fill_holds_for_any_access_order() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let initial: Vec<i64> = (0..8).map(|_| rng.gen_range(-50..50)).collect();
            let mut addrs: Vec<i64> = (8..200).collect();
            addrs.shuffle(&mut rng);

            let mut mem = MemoryBank::new(&initial);
            for addr in addrs {
                assert_eq!(mem.get(addr).unwrap(), 0);
            }
            assert_eq!(&mem.as_slice()[..8], initial.as_slice());
        }
    }
}
