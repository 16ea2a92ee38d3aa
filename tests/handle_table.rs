//! Integration coverage for the handle round-trip law (spec §8): for any
//! resource R inserted with handle h, lookup(h) returns R until removed; a
//! released handle is reissued before any fresh handle beyond the current
//! high-water mark. `handle.rs` itself carries the unit-level cases; this
//! file exercises the table the way the ABI actually does, through several
//! independently-typed tables sharing the same recycling policy.

use gs_metal::handle::HandleTable;

#[derive(Debug, PartialEq, Eq, Clone)]
struct Resource(u32);

#[test]
fn round_trips_across_many_resource_kinds() {
    let mut vertex_buffers: HandleTable<Resource> = HandleTable::new();
    let mut textures: HandleTable<Resource> = HandleTable::new();

    let vb = vertex_buffers.insert(Resource(1));
    let tex = textures.insert(Resource(2));

    // Handles from distinct tables are not interchangeable, but both round-trip.
    assert_eq!(vertex_buffers.get(vb), Some(&Resource(1)));
    assert_eq!(textures.get(tex), Some(&Resource(2)));

    vertex_buffers.remove(vb);
    assert_eq!(vertex_buffers.get(vb), None);
    assert_eq!(textures.get(tex), Some(&Resource(2)));
}

#[test]
fn released_handle_is_reissued_before_high_water_mark_advances() {
    let mut t: HandleTable<Resource> = HandleTable::with_capacity(2);
    let a = t.insert(Resource(10));
    let b = t.insert(Resource(20));
    t.remove(a);
    let c = t.insert(Resource(30));
    assert_eq!(c, a, "released handle must be recycled ahead of growth");
    assert_eq!(t.get(b), Some(&Resource(20)));
    assert_eq!(t.get(c), Some(&Resource(30)));
}

#[test]
fn replace_overwrites_in_place_without_touching_free_list() {
    let mut t: HandleTable<Resource> = HandleTable::new();
    let h = t.insert(Resource(1));
    let old = t.replace(h, Resource(2));
    assert_eq!(old, Some(Resource(1)));
    assert_eq!(t.get(h), Some(&Resource(2)));

    // A second handle must still come from the free list, not collide with h.
    let h2 = t.insert(Resource(3));
    assert_ne!(h2, h);
}

#[test]
fn removing_an_unknown_handle_is_a_soft_no_op() {
    let mut t: HandleTable<Resource> = HandleTable::new();
    assert_eq!(t.remove(999), None);
    assert_eq!(t.remove(0), None);
}
