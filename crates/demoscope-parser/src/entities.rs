//! Entity state tracking and packet-entities decoding.
//!
//! The [`EntityTracker`] is the only state carried from one packet to the
//! next. It holds one slot per edict; each live slot records the entity's
//! class, handle, visibility and the last value seen for every prop of its
//! flattened schema.

use demoscope_arena::Arena;
use demoscope_bits::BitReader;
use demoscope_core::id::{ENTITY_INDEX_BITS, ENTITY_SERIAL_BITS, MAX_EDICTS};
use demoscope_core::{
    ClassId, ClassSchema, DemoError, DemoVersion, EntityHandle, EntityIndex, PropValue, SchemaSet,
};
use smallvec::SmallVec;
use tracing::trace;

use crate::netmessages::PacketEntities;
use crate::props::decode_value;

// ── Tracked state ───────────────────────────────────────────────

/// Last known state of one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityState {
    /// Server class.
    pub class_id: ClassId,
    /// Index and serial number.
    pub handle: EntityHandle,
    /// Whether the entity is in the recording player's PVS.
    pub in_pvs: bool,
    /// One entry per prop of the class schema; `None` until first sent.
    pub props: Vec<Option<PropValue>>,
}

impl EntityState {
    fn new(class_id: ClassId, handle: EntityHandle, prop_count: usize) -> Self {
        Self {
            class_id,
            handle,
            in_pvs: true,
            props: vec![None; prop_count],
        }
    }

    /// Last value of prop `index`.
    pub fn prop(&self, index: usize) -> Option<&PropValue> {
        self.props.get(index).and_then(Option::as_ref)
    }
}

/// Entities alive in the current decode session, indexed by edict.
#[derive(Clone, Debug)]
pub struct EntityTracker {
    slots: Vec<Option<EntityState>>,
    live: usize,
}

impl Default for EntityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTracker {
    /// An empty tracker with a slot for every edict.
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_EDICTS as usize],
            live: 0,
        }
    }

    /// State of the entity at `index`.
    pub fn get(&self, index: EntityIndex) -> Option<&EntityState> {
        self.slots.get(usize::from(index.0)).and_then(Option::as_ref)
    }

    /// Live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityIndex, &EntityState)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (EntityIndex(i as u16), s)))
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no entity is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Forget every entity.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.live = 0;
    }

    fn slot_mut(&mut self, index: EntityIndex) -> &mut Option<EntityState> {
        &mut self.slots[usize::from(index.0)]
    }

    fn insert(&mut self, index: EntityIndex, state: EntityState) {
        if self.slot_mut(index).replace(state).is_none() {
            self.live += 1;
        }
    }

    fn remove(&mut self, index: EntityIndex) -> Option<EntityState> {
        let removed = self.slot_mut(index).take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }
}

// ── Decoded updates ─────────────────────────────────────────────

/// Transition selected by an update record's two type bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateType {
    /// Props changed on a tracked entity.
    Delta,
    /// The entity left the PVS but is still tracked.
    LeavePvs,
    /// The entity entered the PVS with a full prop set.
    EnterPvs,
    /// The entity was destroyed.
    Delete,
}

impl UpdateType {
    /// Decode the two type bits: bit 0 is "leave", bit 1 "enter or delete".
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::Delta,
            1 => Self::LeavePvs,
            2 => Self::EnterPvs,
            _ => Self::Delete,
        }
    }

    /// The two type bits for this transition.
    pub fn to_bits(self) -> u32 {
        match self {
            Self::Delta => 0,
            Self::LeavePvs => 1,
            Self::EnterPvs => 2,
            Self::Delete => 3,
        }
    }
}

/// One decoded prop value, keyed by its index in the class schema.
#[derive(Clone, Debug, PartialEq)]
pub struct PropUpdate {
    /// Index into the class's flattened props.
    pub index: usize,
    /// The value sent.
    pub value: PropValue,
}

/// One decoded update record.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityUpdate {
    /// Entity slot.
    pub index: EntityIndex,
    /// Transition.
    pub update_type: UpdateType,
    /// Class of the entity; `None` when a leave or delete names an
    /// untracked slot.
    pub class_id: Option<ClassId>,
    /// Handle of the entity, under the same condition as `class_id`.
    pub handle: Option<EntityHandle>,
    /// Props sent with the record, in wire order.
    pub props: Vec<PropUpdate>,
}

/// Every update carried by one packet-entities message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacketEntitiesParsed {
    /// Update records in wire order.
    pub updates: Vec<EntityUpdate>,
    /// Entities removed by the trailing delete list of a delta snapshot.
    pub explicit_deletes: Vec<EntityIndex>,
}

// ── Decoding ────────────────────────────────────────────────────

/// Decode the update records of `message` and apply them to `tracker`.
///
/// `names` is the arena the schema names live in; it is only consulted to
/// name a prop in an error.
pub fn decode_packet_entities(
    message: &PacketEntities<'_>,
    version: &DemoVersion,
    schemas: &SchemaSet,
    names: &Arena,
    tracker: &mut EntityTracker,
) -> Result<PacketEntitiesParsed, DemoError> {
    let mut r = message.data.rewound();
    let mut parsed = PacketEntitiesParsed {
        updates: Vec::with_capacity(message.updated_entries as usize),
        explicit_deletes: Vec::new(),
    };
    let decoder = PropListDecoder { version, names };

    let mut index: i64 = -1;
    for _ in 0..message.updated_entries {
        index += 1 + i64::from(r.read_ubitvar());
        if index >= i64::from(MAX_EDICTS) {
            return Err(DemoError::EntityIndexOutOfRange {
                index: index.min(i64::from(i32::MAX)) as i32,
            });
        }
        let entity = EntityIndex(index as u16);
        let update_type = UpdateType::from_bits(r.read_uint(2));

        let update = match update_type {
            UpdateType::EnterPvs => {
                let class_id = ClassId(r.read_uint(schemas.class_bits()) as u16);
                let serial = r.read_uint(ENTITY_SERIAL_BITS);
                let schema = schemas
                    .get(class_id)
                    .ok_or(DemoError::UnknownClass { class_id })?;
                let handle = EntityHandle::new(entity, serial);
                let props = decoder.read(&mut r, schema, entity)?;

                let reenter = matches!(
                    tracker.get(entity),
                    Some(s) if s.class_id == class_id && s.handle == handle
                );
                if !reenter {
                    tracker.insert(
                        entity,
                        EntityState::new(class_id, handle, schema.props.len()),
                    );
                }
                if let Some(state) = tracker.slot_mut(entity) {
                    state.in_pvs = true;
                    apply(state, &props);
                }
                EntityUpdate {
                    index: entity,
                    update_type,
                    class_id: Some(class_id),
                    handle: Some(handle),
                    props,
                }
            }
            UpdateType::Delta => {
                let state = tracker
                    .slot_mut(entity)
                    .as_mut()
                    .ok_or(DemoError::UnknownEntity { index: entity })?;
                let schema = schemas.get(state.class_id).ok_or(DemoError::UnknownClass {
                    class_id: state.class_id,
                })?;
                let props = decoder.read(&mut r, schema, entity)?;
                apply(state, &props);
                EntityUpdate {
                    index: entity,
                    update_type,
                    class_id: Some(state.class_id),
                    handle: Some(state.handle),
                    props,
                }
            }
            UpdateType::LeavePvs => {
                let state = tracker.slot_mut(entity).as_mut();
                let (class_id, handle) = match state {
                    Some(s) => {
                        s.in_pvs = false;
                        (Some(s.class_id), Some(s.handle))
                    }
                    None => (None, None),
                };
                EntityUpdate {
                    index: entity,
                    update_type,
                    class_id,
                    handle,
                    props: Vec::new(),
                }
            }
            UpdateType::Delete => {
                let removed = tracker.remove(entity);
                EntityUpdate {
                    index: entity,
                    update_type,
                    class_id: removed.as_ref().map(|s| s.class_id),
                    handle: removed.as_ref().map(|s| s.handle),
                    props: Vec::new(),
                }
            }
        };

        if r.overflowed() {
            return Err(DemoError::Overflow {
                context: "packet entities",
            });
        }
        trace!(entity = %entity, update = ?update_type, props = update.props.len(), "entity update");
        parsed.updates.push(update);
    }

    if message.is_delta {
        while r.read_bit() {
            let entity = EntityIndex(r.read_uint(ENTITY_INDEX_BITS) as u16);
            if r.overflowed() {
                break;
            }
            tracker.remove(entity);
            parsed.explicit_deletes.push(entity);
        }
    }

    if r.overflowed() {
        return Err(DemoError::Overflow {
            context: "packet entities",
        });
    }
    Ok(parsed)
}

fn apply(state: &mut EntityState, props: &[PropUpdate]) {
    for p in props {
        state.props[p.index] = Some(p.value.clone());
    }
}

struct PropListDecoder<'v> {
    version: &'v DemoVersion,
    names: &'v Arena,
}

impl PropListDecoder<'_> {
    /// Read one record's prop list. New-engine recordings send every index
    /// before the first value; older ones interleave index and value.
    fn read(
        &self,
        r: &mut BitReader<'_>,
        schema: &ClassSchema,
        entity: EntityIndex,
    ) -> Result<Vec<PropUpdate>, DemoError> {
        let new_way = self.version.has_new_way_field_index() && r.read_bit();
        let count = schema.props.len();

        let next_index = |r: &mut BitReader<'_>, last: i32| -> Result<Option<usize>, DemoError> {
            let Some(index) = r.read_field_index(last, new_way) else {
                return Ok(None);
            };
            if r.overflowed() {
                return Err(DemoError::Overflow {
                    context: "entity prop list",
                });
            }
            if index < 0 || index as usize >= count {
                return Err(DemoError::PropIndexOutOfRange {
                    entity,
                    index,
                    count,
                });
            }
            Ok(Some(index as usize))
        };

        let mut out = Vec::new();
        let mut last = -1;
        if self.version.game.is_new_engine() {
            let mut indices: SmallVec<[usize; 32]> = SmallVec::new();
            while let Some(i) = next_index(r, last)? {
                indices.push(i);
                last = i as i32;
            }
            out.reserve(indices.len());
            for i in indices {
                let value = decode_value(r, &schema.props[i].prop, self.names)?;
                out.push(PropUpdate { index: i, value });
            }
        } else {
            while let Some(i) = next_index(r, last)? {
                let value = decode_value(r, &schema.props[i].prop, self.names)?;
                out.push(PropUpdate { index: i, value });
                last = i as i32;
            }
        }
        if r.overflowed() {
            return Err(DemoError::Overflow {
                context: "entity props",
            });
        }
        Ok(out)
    }
}
