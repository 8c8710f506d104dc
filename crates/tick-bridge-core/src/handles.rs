//! The opaque reference table.
//!
//! Only integers and byte buffers can cross the module boundary, so host
//! objects are handed to the module as [`Handle`]s: small integers issued by
//! a [`HandleTable`]. The table is a generation-tagged slot arena. Freeing a
//! slot bumps its generation, so a handle that outlives its registration can
//! never be mistaken for the slot's next occupant; a misused handle is a
//! checked error, never a reference to an unrelated object.

use tick_bridge_common::HandleError;

/// Generations occupy 31 bits so the packed `i64` form keeps its sign bit
/// clear. Bumping wraps within this range.
const GENERATION_MASK: u32 = 0x7FFF_FFFF;

fn next_generation(generation: u32) -> u32 {
    (generation + 1) & GENERATION_MASK
}

/// An opaque handle to one entry in a [`HandleTable`].
///
/// Packs a slot index and that slot's generation at registration time. The
/// handle crosses the wasm boundary as a non-negative `i64`
/// (`generation << 32 | index`); the module attaches no meaning to it beyond
/// passing it back into capability imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// The slot index within the table.
    pub fn index(self) -> u32 {
        self.index
    }

    /// The slot generation this handle was issued at.
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack the handle into the integer form that crosses the wasm
    /// boundary. Generations are kept within 31 bits, so the result is
    /// always non-negative.
    pub fn to_bits(self) -> i64 {
        (i64::from(self.generation) << 32) | i64::from(self.index)
    }

    /// Decode a raw integer received from the module.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Malformed`] for values that cannot have been
    /// produced by [`Handle::to_bits`].
    pub fn from_bits(bits: i64) -> Result<Self, HandleError> {
        if bits < 0 {
            return Err(HandleError::Malformed { bits });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(Self {
            index: (bits & 0xFFFF_FFFF) as u32,
            generation: (bits >> 32) as u32,
        })
    }
}

/// One slot in the arena.
#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generation-tagged slot arena mapping handles to host objects.
///
/// The table owns the registered values; dropping or invalidating an entry
/// drops the value. Identity is preserved per registration: registering the
/// same logical object twice yields two distinct live handles.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> HandleTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Register a host object and return its handle.
    ///
    /// Reuses a freed slot when one is available; the slot's bumped
    /// generation keeps any previously issued handle for it dead.
    pub fn register(&mut self, value: T) -> Handle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .expect("handle table exceeded u32::MAX slots");
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.live += 1;

        Handle {
            index,
            generation: slot.generation,
        }
    }

    /// Dereference a handle.
    ///
    /// # Errors
    ///
    /// Fails with the precise reason (out of range, stale generation, or
    /// vacant slot) and never yields an unrelated object.
    pub fn get(&self, handle: Handle) -> Result<&T, HandleError> {
        let slot = self.slot(handle)?;
        slot.value.as_ref().ok_or(HandleError::Vacant {
            index: handle.index,
        })
    }

    /// Dereference a handle mutably.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`HandleTable::get`].
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut T, HandleError> {
        let index = handle.index;
        self.slot(handle)?;
        self.slots[index as usize]
            .value
            .as_mut()
            .ok_or(HandleError::Vacant { index })
    }

    /// Remove a handle's entry, returning the value.
    ///
    /// The slot's generation is bumped so the removed handle (and any copy
    /// of it) stays invalid even after the slot is reused.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`HandleTable::get`].
    pub fn remove(&mut self, handle: Handle) -> Result<T, HandleError> {
        let index = handle.index;
        self.slot(handle)?;

        let slot = &mut self.slots[index as usize];
        let value = slot.value.take().ok_or(HandleError::Vacant { index })?;
        slot.generation = next_generation(slot.generation);
        self.free.push(index);
        self.live -= 1;

        Ok(value)
    }

    /// Invalidate every live handle and drop every stored value.
    ///
    /// Called at tick boundaries when handles are tick-scoped. Every
    /// occupied slot's generation is bumped, so all previously issued
    /// handles dereference to [`HandleError::Stale`] from here on.
    pub fn invalidate_all(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = next_generation(slot.generation);
                #[allow(clippy::cast_possible_truncation)]
                self.free.push(index as u32);
            }
        }
        self.live = 0;
    }

    /// Number of currently live handles.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no handle is currently live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn slot(&self, handle: Handle) -> Result<&Slot<T>, HandleError> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .ok_or(HandleError::OutOfRange {
                index: handle.index,
            })?;

        if slot.generation != handle.generation {
            return Err(HandleError::Stale {
                index: handle.index,
                current: slot.generation,
                held: handle.generation,
            });
        }

        Ok(slot)
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
