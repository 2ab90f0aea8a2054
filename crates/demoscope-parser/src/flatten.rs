//! Send-table flattening.
//!
//! Turns each server class's table tree into the ordered prop list that
//! entity deltas index into. The order is the engine's:
//!
//! 1. Every `(table, prop)` exclusion reachable from the root is gathered.
//! 2. Props are gathered depth-first. Inside-array props, exclude props and
//!    excluded pairs are skipped. A collapsible nested table is expanded in
//!    place; any other nested table is gathered as a unit and lands before
//!    the props of the table that references it.
//! 3. The list is partitioned into priority tiers, lowest priority first.
//!    Changes-often props join the tier of priority 64.

use demoscope_arena::Arena;
use demoscope_core::sendtable::CHANGES_OFTEN_PRIORITY;
use demoscope_core::{
    ArenaStr, ClassSchema, DemoError, FlatProp, PropFlags, PropKind, SchemaSet, SendTable,
};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::datatables::DataTablesParsed;

/// Flatten every class in `parsed`. Names resolve through `arena`.
pub fn flatten(parsed: &DataTablesParsed, arena: &Arena) -> Result<SchemaSet, DemoError> {
    let flattener = Flattener::new(parsed, arena)?;
    let mut classes = Vec::with_capacity(parsed.classes.len());
    for class in &parsed.classes {
        let root = flattener.table(class.table)?;
        let props = flattener.flatten_table(root)?;
        classes.push(ClassSchema {
            class_id: class.id,
            class_name: class.name,
            table_name: class.table,
            props,
        });
    }

    let set = SchemaSet::new(classes);
    debug!(
        classes = set.len(),
        props = set.iter().map(|c| c.props.len()).sum::<usize>(),
        "flattened send tables"
    );
    Ok(set)
}

type Exclusions<'a> = IndexSet<(&'a [u8], &'a [u8])>;

struct Flattener<'a> {
    tables: IndexMap<&'a [u8], &'a SendTable>,
    arena: &'a Arena,
}

impl<'a> Flattener<'a> {
    fn new(parsed: &'a DataTablesParsed, arena: &'a Arena) -> Result<Self, DemoError> {
        let mut tables = IndexMap::with_capacity(parsed.tables.len());
        for table in &parsed.tables {
            tables.insert(table.name.resolve(arena)?, table);
        }
        Ok(Self { tables, arena })
    }

    fn name(&self, s: ArenaStr) -> Result<&'a [u8], DemoError> {
        Ok(s.resolve(self.arena)?)
    }

    fn table(&self, name: ArenaStr) -> Result<&'a SendTable, DemoError> {
        let key = self.name(name)?;
        self.tables
            .get(key)
            .copied()
            .ok_or_else(|| DemoError::UnknownTable {
                table: String::from_utf8_lossy(key).into_owned(),
            })
    }

    fn flatten_table(&self, root: &'a SendTable) -> Result<Vec<FlatProp>, DemoError> {
        let mut stack = vec![self.name(root.name)?];

        let mut excludes = Exclusions::new();
        self.gather_excludes(root, &mut excludes, &mut stack)?;

        let mut props = Vec::new();
        self.gather_props(root, &excludes, &mut props, &mut stack)?;

        sort_by_priority(&mut props);
        Ok(props)
    }

    /// Push `table` onto the ancestor stack, failing if it is already there.
    fn enter(&self, table: &'a SendTable, stack: &mut Vec<&'a [u8]>) -> Result<(), DemoError> {
        let name = self.name(table.name)?;
        if stack.contains(&name) {
            return Err(DemoError::CyclicTable {
                table: String::from_utf8_lossy(name).into_owned(),
            });
        }
        stack.push(name);
        Ok(())
    }

    fn gather_excludes(
        &self,
        table: &'a SendTable,
        excludes: &mut Exclusions<'a>,
        stack: &mut Vec<&'a [u8]>,
    ) -> Result<(), DemoError> {
        for prop in &table.props {
            match prop.kind {
                PropKind::Exclude { table: target } => {
                    excludes.insert((self.name(target)?, self.name(prop.name)?));
                }
                PropKind::DataTable { table: child } => {
                    let child = self.table(child)?;
                    self.enter(child, stack)?;
                    self.gather_excludes(child, excludes, stack)?;
                    stack.pop();
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn gather_props(
        &self,
        table: &'a SendTable,
        excludes: &Exclusions<'a>,
        out: &mut Vec<FlatProp>,
        stack: &mut Vec<&'a [u8]>,
    ) -> Result<(), DemoError> {
        let mut local = Vec::new();
        self.iterate_props(table, excludes, &mut local, out, stack)?;
        out.append(&mut local);
        Ok(())
    }

    fn iterate_props(
        &self,
        table: &'a SendTable,
        excludes: &Exclusions<'a>,
        local: &mut Vec<FlatProp>,
        out: &mut Vec<FlatProp>,
        stack: &mut Vec<&'a [u8]>,
    ) -> Result<(), DemoError> {
        let table_name = self.name(table.name)?;
        for prop in &table.props {
            if prop.flags.intersects(PropFlags::INSIDEARRAY | PropFlags::EXCLUDE)
                || matches!(prop.kind, PropKind::Exclude { .. })
            {
                continue;
            }
            if excludes.contains(&(table_name, self.name(prop.name)?)) {
                continue;
            }

            if let PropKind::DataTable { table: child } = prop.kind {
                let child = self.table(child)?;
                self.enter(child, stack)?;
                if prop.flags.contains(PropFlags::COLLAPSIBLE) {
                    self.iterate_props(child, excludes, local, out, stack)?;
                } else {
                    self.gather_props(child, excludes, out, stack)?;
                }
                stack.pop();
            } else {
                local.push(FlatProp {
                    prop: prop.clone(),
                    owner: table.name,
                });
            }
        }
        Ok(())
    }
}

fn sort_by_priority(props: &mut [FlatProp]) {
    let mut priorities: Vec<u8> = props.iter().map(|p| p.prop.priority).collect();
    priorities.push(CHANGES_OFTEN_PRIORITY);
    priorities.sort_unstable();
    priorities.dedup();

    let mut start = 0;
    for priority in priorities {
        for i in start..props.len() {
            let prop = &props[i].prop;
            let matches = prop.priority == priority
                || (prop.flags.contains(PropFlags::CHANGES_OFTEN)
                    && priority == CHANGES_OFTEN_PRIORITY);
            if matches {
                props.swap(i, start);
                start += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoscope_core::sendtable::DEFAULT_PROP_PRIORITY;
    use demoscope_core::{ClassId, NumericInfo, Pool, SendProp, ServerClass};

    struct Fixture {
        arena: Arena,
        tables: DataTablesParsed,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arena: Arena::with_first_block(1024),
                tables: DataTablesParsed::default(),
            }
        }

        fn s(&mut self, name: &str) -> ArenaStr {
            ArenaStr::intern(&mut self.arena, Pool::Schema, name.as_bytes())
        }

        fn int(&mut self, name: &str, priority: u8, flags: PropFlags) -> SendProp {
            SendProp {
                name: self.s(name),
                flags,
                priority,
                kind: PropKind::Int(NumericInfo {
                    low: 0.0,
                    high: 0.0,
                    bits: 8,
                }),
            }
        }

        fn nested(&mut self, table: &str, flags: PropFlags) -> SendProp {
            SendProp {
                name: self.s(table),
                flags,
                priority: DEFAULT_PROP_PRIORITY,
                kind: PropKind::DataTable {
                    table: self.s(table),
                },
            }
        }

        fn exclude(&mut self, table: &str, prop: &str) -> SendProp {
            SendProp {
                name: self.s(prop),
                flags: PropFlags::EXCLUDE,
                priority: DEFAULT_PROP_PRIORITY,
                kind: PropKind::Exclude {
                    table: self.s(table),
                },
            }
        }

        fn table(&mut self, name: &str, props: Vec<SendProp>) {
            let name = self.s(name);
            self.tables.tables.push(SendTable {
                name,
                needs_decoder: false,
                props,
            });
        }

        fn class(&mut self, name: &str, table: &str) {
            let id = ClassId(self.tables.classes.len() as u16);
            let name = self.s(name);
            let table = self.s(table);
            self.tables.classes.push(ServerClass { id, name, table });
        }

        fn names(&self, set: &SchemaSet, class: u16) -> Vec<String> {
            set.get(ClassId(class))
                .unwrap()
                .props
                .iter()
                .map(|p| {
                    String::from_utf8_lossy(p.prop.name.resolve(&self.arena).unwrap()).into_owned()
                })
                .collect()
        }
    }

    fn p() -> u8 {
        DEFAULT_PROP_PRIORITY
    }

    #[test]
    fn collapsible_inline_and_nested_first() {
        let mut f = Fixture::new();
        let a = f.int("a", p(), PropFlags::empty());
        let b = f.int("b", p(), PropFlags::empty());
        f.table("DT_Inline", vec![a, b]);
        let c = f.int("c", p(), PropFlags::empty());
        f.table("DT_Nested", vec![c]);

        let x = f.int("x", p(), PropFlags::empty());
        let inline = f.nested("DT_Inline", PropFlags::COLLAPSIBLE);
        let y = f.int("y", p(), PropFlags::empty());
        let nested = f.nested("DT_Nested", PropFlags::empty());
        let z = f.int("z", p(), PropFlags::empty());
        f.table("DT_Root", vec![x, inline, y, nested, z]);
        f.class("CRoot", "DT_Root");

        let set = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(f.names(&set, 0), ["c", "x", "a", "b", "y", "z"]);
        let owner = set.get(ClassId(0)).unwrap().props[0].owner;
        assert_eq!(owner.resolve(&f.arena).unwrap(), b"DT_Nested");
    }

    #[test]
    fn exclusion_applies_at_any_depth() {
        let mut f = Fixture::new();
        let origin = f.int("m_vecOrigin", p(), PropFlags::empty());
        let angles = f.int("m_angRotation", p(), PropFlags::empty());
        f.table("DT_Base", vec![origin, angles]);
        let base = f.nested("DT_Base", PropFlags::empty());
        f.table("DT_Middle", vec![base]);
        let middle = f.nested("DT_Middle", PropFlags::COLLAPSIBLE);
        let excl = f.exclude("DT_Base", "m_vecOrigin");
        f.table("DT_Leaf", vec![middle, excl]);
        f.class("CLeaf", "DT_Leaf");
        f.class("CMiddle", "DT_Middle");

        let set = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(f.names(&set, 0), ["m_angRotation"]);
        assert_eq!(f.names(&set, 1), ["m_vecOrigin", "m_angRotation"]);
    }

    #[test]
    fn inside_array_props_are_skipped() {
        let mut f = Fixture::new();
        let element = f.int("000", p(), PropFlags::INSIDEARRAY);
        let array = SendProp {
            name: f.s("m_iAmmo"),
            flags: PropFlags::empty(),
            priority: p(),
            kind: PropKind::Array {
                element: Box::new(element.clone()),
                num_elements: 32,
            },
        };
        f.table("DT_Ammo", vec![element, array]);
        f.class("CAmmo", "DT_Ammo");

        let set = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(f.names(&set, 0), ["m_iAmmo"]);
    }

    #[test]
    fn priority_tiers_ascending_with_changes_often() {
        let mut f = Fixture::new();
        let slow = f.int("slow", 200, PropFlags::empty());
        let normal = f.int("normal", p(), PropFlags::empty());
        let often = f.int("often", p(), PropFlags::CHANGES_OFTEN);
        let urgent = f.int("urgent", 1, PropFlags::empty());
        let normal2 = f.int("normal2", p(), PropFlags::empty());
        f.table("DT_Prio", vec![slow, normal, often, urgent, normal2]);
        f.class("CPrio", "DT_Prio");

        let set = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(
            f.names(&set, 0),
            ["urgent", "often", "normal", "normal2", "slow"]
        );
    }

    #[test]
    fn tier_pass_swaps_rather_than_shifts() {
        let mut f = Fixture::new();
        let a = f.int("a", p(), PropFlags::empty());
        let b = f.int("b", p(), PropFlags::empty());
        let c = f.int("c", p(), PropFlags::empty());
        let d = f.int("d", 1, PropFlags::empty());
        f.table("DT_Swap", vec![a, b, c, d]);
        f.class("CSwap", "DT_Swap");

        // Entity prop indices on real recordings depend on this exact order:
        // `d` trades places with `a`, it does not push the others back.
        let set = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(f.names(&set, 0), ["d", "b", "c", "a"]);
    }

    #[test]
    fn flattening_is_deterministic() {
        let mut f = Fixture::new();
        let props: Vec<SendProp> = (0..40u8)
            .map(|i| {
                let flags = if i % 7 == 0 {
                    PropFlags::CHANGES_OFTEN
                } else {
                    PropFlags::empty()
                };
                f.int(&format!("p{i}"), i % 5 * 40, flags)
            })
            .collect();
        f.table("DT_Many", props);
        f.class("CMany", "DT_Many");

        let first = flatten(&f.tables, &f.arena).unwrap();
        let second = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.get(ClassId(0)).unwrap().props.len(), 40);
    }

    #[test]
    fn cyclic_reference_is_rejected() {
        let mut f = Fixture::new();
        let to_b = f.nested("DT_B", PropFlags::empty());
        f.table("DT_A", vec![to_b]);
        let to_a = f.nested("DT_A", PropFlags::COLLAPSIBLE);
        f.table("DT_B", vec![to_a]);
        f.class("CA", "DT_A");

        match flatten(&f.tables, &f.arena) {
            Err(DemoError::CyclicTable { table }) => assert_eq!(table, "DT_A"),
            other => panic!("expected CyclicTable, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_names_are_rejected() {
        let mut f = Fixture::new();
        let missing = f.nested("DT_Missing", PropFlags::empty());
        f.table("DT_Root", vec![missing]);
        f.class("CRoot", "DT_Root");
        assert!(matches!(
            flatten(&f.tables, &f.arena),
            Err(DemoError::UnknownTable { table }) if table == "DT_Missing"
        ));

        let mut f = Fixture::new();
        f.class("CNothing", "DT_Nothing");
        assert!(matches!(
            flatten(&f.tables, &f.arena),
            Err(DemoError::UnknownTable { .. })
        ));
    }

    #[test]
    fn shared_table_expands_per_reference() {
        let mut f = Fixture::new();
        let v = f.int("v", p(), PropFlags::empty());
        f.table("DT_Shared", vec![v]);
        let first = f.nested("DT_Shared", PropFlags::COLLAPSIBLE);
        let second = f.nested("DT_Shared", PropFlags::COLLAPSIBLE);
        f.table("DT_Twice", vec![first, second]);
        f.class("CTwice", "DT_Twice");

        let set = flatten(&f.tables, &f.arena).unwrap();
        assert_eq!(f.names(&set, 0), ["v", "v"]);
    }
}
