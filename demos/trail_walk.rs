//! Walk a simulated user along a trail and print what the guide reports.
//!
//! Run with: cargo run --example trail_walk

use std::time::{Duration, Instant};

use serde_json::json;
use trail_guide::geo_utils::{destination, haversine_distance, initial_bearing};
use trail_guide::{
    ChangeKind, Coordinate, GuideConfig, GuideEvent, ImageCache, LocationState, MemoryImageStore, Trail,
    TrailGuide, UserLocation,
};

fn main() {
    // A short trail through uptown Charlotte, NC
    let coordinates = vec![
        Coordinate::new(35.2210, -80.8290),
        Coordinate::new(35.2195, -80.8305),
        Coordinate::new(35.2180, -80.8318),
        Coordinate::new(35.2169, -80.8327),
        Coordinate::new(35.2155, -80.8340),
    ];
    let trail = match Trail::new("Trail of History", coordinates.clone()) {
        Ok(trail) => trail,
        Err(e) => {
            eprintln!("Could not build trail: {}", e);
            return;
        }
    };

    let config = GuideConfig::default();
    println!("Trail Walk\n");
    println!(
        "Config: tolerance={} yds, cone={}°, strategy={:?}\n",
        config.lateral_tolerance_yards, config.forward_cone_degrees, config.selection_strategy
    );

    let mut guide = TrailGuide::new(
        config.clone(),
        LocationState::new(&config.application_name),
        ImageCache::new(MemoryImageStore::new()),
    );

    let _subscription = guide.subscribe(|event| {
        if let GuideEvent::Alert { alert } = event {
            println!("   ALERT {}: {}", alert.title, alert.body);
        }
    });

    guide.set_trail(Ok(trail));

    let pois = [
        ("polk", "James K. Polk", 35.2200, -80.8300),
        ("jack", "Captain Jack", 35.2169, -80.8327),
        ("queen", "Queen Charlotte", 35.2158, -80.8338),
    ];
    for (key, name, latitude, longitude) in pois {
        guide.on_poi_record(
            ChangeKind::Added,
            key,
            json!({
                "name": name,
                "latitude": latitude,
                "longitude": longitude,
                "description": format!("Statue of {}", name),
                "imageUrl": format!("https://example.com/{}.jpg", key),
            }),
        );
    }
    guide.on_directory_loaded();
    guide.on_connectivity(true);

    // Walk each leg in four steps, facing along the trail
    let start = Instant::now();
    let mut tick = 0u32;
    for leg in coordinates.windows(2) {
        let heading = initial_bearing(&leg[0], &leg[1]);
        let leg_length = haversine_distance(&leg[0], &leg[1]);

        for step in 0..4 {
            let position = destination(&leg[0], heading, leg_length * step as f64 / 4.0);
            let now = start + Duration::from_secs(tick as u64 * 15);
            tick += 1;

            let fix = UserLocation::new(position, 5.0).with_heading(heading);
            let events = guide.on_location(fix, now);

            println!(
                "{:>2}. ({:.5}, {:.5}) heading {:>5.1}° on-trail={} current={}",
                tick,
                position.latitude,
                position.longitude,
                heading,
                guide.is_on_trail(),
                guide.current_poi().unwrap_or("-"),
            );
            for event in events {
                if let GuideEvent::SelectionChanged { change } = event {
                    println!("    -> selected {:?} ({:?})", change.current, change.cause);
                }
            }
        }
    }

    println!("\nDistances at the end of the walk:");
    for poi in guide.directory().iter() {
        println!("   {:<16} {}", poi.name, poi.distance_text());
    }

    // Step well off the trail
    let off = destination(&Coordinate::new(35.2169, -80.8327), 45.0, 200.0);
    guide.on_location(UserLocation::new(off, 5.0), start + Duration::from_secs(600));
    println!("\n200 m off the trail: on-trail={}", guide.is_on_trail());
}
