//! Basic demonstration of the Hexfield map core.
//!
//! Run with: cargo run --example basic_demo

use hexmap_core::coords::{pseudo_random, world_position};
use hexmap_core::objects::{ArmyData, StructureData};
use hexmap_core::{
    Biome, FeedUpdate, HexCoord, MapConfig, MapWorld, ObjectId, StructureCategory, TileEntity,
    TroopCategory, TroopTier,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    println!("=== Hexfield - Map Core Demo ===\n");

    // A single-chunk window keeps the demo output readable.
    let config = MapConfig {
        chunk_load_radius_x: 0,
        chunk_load_radius_z: 0,
        ..MapConfig::default()
    };
    let mut map = MapWorld::with_config(config);
    map.register_materials();

    // Stream the starting window and resolve its fetch with synthetic land.
    map.update_camera(0.0, 0.0);
    for request in map.drain_fetch_requests() {
        println!("fetch {} covers {} hexes", request.id.0, request.hexes.len());
        let tiles: Vec<TileEntity> = request
            .hexes
            .iter()
            .map(|&hex| TileEntity {
                hex,
                biome: synth_biome(hex),
            })
            .collect();
        map.deliver_fetched(request.id, Ok(tiles));
    }
    println!(
        "explored {} of {} resident hexes\n",
        map.explored_count(),
        map.resident_count()
    );

    // The feed reports a realm and two armies.
    map.apply_update(FeedUpdate::StructureUpsert(StructureData {
        id: ObjectId(10),
        hex: HexCoord::new(1, 1),
        category: StructureCategory::Realm,
        level: 2,
        has_wonder: false,
        owner: Some("harrow".into()),
    }));
    map.apply_update(FeedUpdate::ArmyUpsert(army(1, 0, 0)));
    map.apply_update(FeedUpdate::ArmyUpsert(army(2, 2, 3)));

    println!("Initial state:");
    print_state(&mut map);

    // A position change from the feed; the army walks the explored route.
    println!("\n--- Army 1 reported at (4, 0), walking there ---\n");
    map.apply_update(FeedUpdate::ArmyUpsert(army(1, 4, 0)));

    for frame in 0..90u32 {
        map.step(1.0 / 30.0);
        if (frame + 1) % 30 == 0 {
            println!(
                "--- Frame {} (t={:.1}s) ---",
                map.current_frame(),
                map.current_time()
            );
            print_state(&mut map);
        }
    }

    // Click the hex army 2 stands on to select it.
    println!("\n--- Clicking army 2's hex ---\n");
    map.drain_events();
    let spot = world_position(HexCoord::new(2, 3), true);
    map.handle_click(spot.x, spot.z);
    for event in map.drain_events() {
        println!("event: {:?}", event);
    }
    println!("selected: {:?}", map.selected());

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", map.snapshot().to_json_pretty().unwrap());
}

fn army(id: u32, col: i32, row: i32) -> ArmyData {
    ArmyData {
        id: ObjectId(id),
        hex: HexCoord::new(col, row),
        category: TroopCategory::Knight,
        tier: TroopTier::T1,
        owner: Some("harrow".into()),
        troop_count: 100,
        stamina: 25,
        max_stamina: 50,
    }
}

/// Deterministic land-only biome so the demo march never hits open water.
fn synth_biome(hex: HexCoord) -> Biome {
    let roll = pseudo_random(hex.col as f32 * 7.3, hex.row as f32 * 3.1);
    let index = 2 + (roll * 13.9) as usize;
    Biome::ALL[index.min(Biome::ALL.len() - 1)]
}

fn print_state(map: &mut MapWorld) {
    let snapshot = map.snapshot();

    println!("  armies:");
    for army in &snapshot.armies {
        println!(
            "    Army {}: ({}, {}) {} {} troops={} moving={}",
            army.id, army.col, army.row, army.category, army.tier, army.troop_count, army.moving
        );
    }
    println!("  structures:");
    for site in &snapshot.structures {
        println!(
            "    Structure {}: ({}, {}) {} lvl {}",
            site.id, site.col, site.row, site.category, site.level
        );
    }
    println!(
        "  draws: {} sprites, {} labels, {} ground instances",
        snapshot.sprites.len(),
        snapshot.labels.len(),
        snapshot.ground.as_ref().map_or(0, |g| g.instances.len())
    );
}
