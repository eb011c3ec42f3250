/// Fixed-capacity circular buffer of raw encoded records.
///
/// Slot buffers are reused on overwrite, so steady-state pushes do not
/// allocate once every slot has grown to its working size.
pub struct TailRing {
    slots: Vec<Vec<u8>>,
    write_index: usize,
    count: usize,
}

impl TailRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Vec::new()).collect(),
            write_index: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Stores a copy of `record`, overwriting the oldest entry when full.
    pub fn push(&mut self, record: &[u8]) {
        let capacity = self.slots.len();
        if capacity == 0 {
            return;
        }

        let slot = &mut self.slots[self.write_index];
        slot.clear();
        slot.extend_from_slice(record);

        self.write_index = (self.write_index + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    /// Copies out the newest `max_n` records, oldest first and newest last.
    pub fn snapshot(&self, max_n: usize) -> Vec<Vec<u8>> {
        let n = max_n.min(self.count);
        let capacity = self.slots.len();
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return out;
        }

        let start = (self.write_index + capacity - n) % capacity;
        for i in 0..n {
            out.push(self.slots[(start + i) % capacity].clone());
        }
        out
    }
}
