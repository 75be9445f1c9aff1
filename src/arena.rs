use serde::{Deserialize, Serialize};

/// Stable handle to an organism. The generation field invalidates stale references.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct OrganismId {
    pub index: u32,
    pub generation: u32,
}

/// Slot storage with generational indices and a free list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
    count: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn spawn(&mut self, value: T) -> OrganismId {
        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            self.slots[idx] = Some(value);
            self.count += 1;
            OrganismId {
                index,
                generation: self.generations[idx],
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(value));
            self.generations.push(0);
            self.count += 1;
            OrganismId {
                index,
                generation: 0,
            }
        }
    }

    pub fn despawn(&mut self, id: OrganismId) -> Option<T> {
        let idx = id.index as usize;
        if idx >= self.slots.len() || self.generations[idx] != id.generation {
            return None;
        }
        let value = self.slots[idx].take()?;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_list.push(id.index);
        self.count -= 1;
        Some(value)
    }

    pub fn get(&self, id: OrganismId) -> Option<&T> {
        let idx = id.index as usize;
        if idx < self.slots.len() && self.generations[idx] == id.generation {
            self.slots[idx].as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: OrganismId) -> Option<&mut T> {
        let idx = id.index as usize;
        if idx < self.slots.len() && self.generations[idx] == id.generation {
            self.slots[idx].as_mut()
        } else {
            None
        }
    }

    pub fn contains(&self, id: OrganismId) -> bool {
        self.get(id).is_some()
    }

    /// Two distinct live entries at once.
    pub fn get2_mut(&mut self, a: OrganismId, b: OrganismId) -> Option<(&mut T, &mut T)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (ia, ib) = (a.index as usize, b.index as usize);
        let (lo, hi) = (ia.min(ib), ia.max(ib));
        let (head, tail) = self.slots.split_at_mut(hi);
        let (first, second) = (head[lo].as_mut()?, tail[0].as_mut()?);
        if ia < ib {
            Some((first, second))
        } else {
            Some((second, first))
        }
    }

    /// Convert every live entry, keeping ids, generations and the free list intact.
    pub fn try_map<U, E>(
        &self,
        mut f: impl FnMut(OrganismId, &T) -> Result<U, E>,
    ) -> Result<Arena<U>, E> {
        let mut slots = Vec::with_capacity(self.slots.len());
        for (i, slot) in self.slots.iter().enumerate() {
            let id = OrganismId {
                index: i as u32,
                generation: self.generations[i],
            };
            slots.push(match slot {
                Some(v) => Some(f(id, v)?),
                None => None,
            });
        }
        Ok(Arena {
            slots,
            generations: self.generations.clone(),
            free_list: self.free_list.clone(),
            count: self.count,
        })
    }

    pub fn map<U>(&self, mut f: impl FnMut(OrganismId, &T) -> U) -> Arena<U> {
        match self.try_map(|id, v| Ok::<_, std::convert::Infallible>(f(id, v))) {
            Ok(arena) => arena,
            Err(never) => match never {},
        }
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> Vec<OrganismId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OrganismId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|v| {
                (
                    OrganismId {
                        index: i as u32,
                        generation: self.generations[i],
                    },
                    v,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (OrganismId, &mut T)> {
        let generations = &self.generations;
        self.slots.iter_mut().enumerate().filter_map(move |(i, slot)| {
            slot.as_mut().map(|v| {
                (
                    OrganismId {
                        index: i as u32,
                        generation: generations[i],
                    },
                    v,
                )
            })
        })
    }
}
