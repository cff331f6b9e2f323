/// Array-backed binary min-heap.
///
/// Elements are ordered by their `Ord` impl; the smallest element is popped
/// first. Equal elements come out in unspecified order.
#[derive(Debug, Clone)]
pub struct MinHeap<T: Ord> {
    items: Vec<T>,
}

impl<T: Ord> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> MinHeap<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an element in O(log n).
    pub fn insert(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the smallest element in O(log n).
    pub fn pop_min(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let min = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        min
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx] >= self.items[parent] {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && self.items[left] < self.items[smallest] {
                smallest = left;
            }
            if right < len && self.items[right] < self.items[smallest] {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.items.swap(idx, smallest);
            idx = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T: Ord>(heap: &mut MinHeap<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = heap.pop_min() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_empty_heap() {
        let mut heap: MinHeap<i32> = MinHeap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.pop_min(), None);
    }

    #[test]
    fn test_pops_in_ascending_order() {
        let mut heap = MinHeap::new();
        for v in [5, 3, 9, 1, 7, 3, 0, 8] {
            heap.insert(v);
        }
        assert_eq!(heap.len(), 8);
        assert_eq!(drain(&mut heap), vec![0, 1, 3, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn test_pseudo_random_inserts() {
        // Linear congruential sequence, enough to shake out sift bugs
        let mut heap = MinHeap::with_capacity(500);
        let mut expected = Vec::new();
        let mut x: u64 = 42;
        for _ in 0..500 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let v = (x >> 33) % 1000;
            heap.insert(v);
            expected.push(v);
        }
        expected.sort();
        assert_eq!(drain(&mut heap), expected);
    }

    #[test]
    fn test_reinsert_after_pop() {
        // Mirrors the merge loop: pop the min, advance it, put it back
        let mut heap = MinHeap::new();
        heap.insert((0, 'a'));
        heap.insert((3, 'b'));
        heap.insert((10, 'c'));

        let mut order = Vec::new();
        while let Some((key, name)) = heap.pop_min() {
            order.push((key, name));
            if key < 6 {
                heap.insert((key + 4, name));
            }
        }

        assert_eq!(
            order,
            vec![
                (0, 'a'),
                (3, 'b'),
                (4, 'a'),
                (7, 'b'),
                (8, 'a'),
                (10, 'c'),
            ]
        );
    }
}
