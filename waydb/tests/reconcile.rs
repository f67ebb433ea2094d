use abstutil::{Tags, Timer};
use geom::Pt2D;
use waydb::{Config, PointFeature, Rlid, SegmentId, Way, WayDatabase};

fn pts(raw: Vec<(f64, f64)>) -> Vec<Pt2D> {
    raw.into_iter().map(|(x, y)| Pt2D::new(x, y)).collect()
}

fn tags(kv: Vec<(&str, &str)>) -> Tags {
    kv.into_iter().collect()
}

// Keys from later layers fill in, but never overwrite
fn union(existing: &mut Tags, incoming: &Tags, _: &str) {
    for (k, v) in incoming.inner() {
        if !existing.contains_key(k) {
            existing.insert(k.clone(), v.clone());
        }
    }
}

fn layout(db: &WayDatabase, rlid: &str) -> Vec<(Pt2D, Pt2D, Tags)> {
    db.way_db[&Rlid::from(rlid)]
        .iter()
        .map(|seg| (db.pt(seg.first()), db.pt(seg.last()), seg.tags.clone()))
        .collect()
}

fn check_dist_increases(db: &WayDatabase) {
    for seg in db.way_db.values().flatten() {
        for pair in seg.pts.windows(2) {
            assert!(db.dist(pair[0]).unwrap() < db.dist(pair[1]).unwrap());
        }
    }
}

#[test]
fn identical_layer_becomes_one_segment() {
    abstutil::logger::setup_for_tests();
    let geometry = pts(vec![(0.0, 0.0), (10.0, 5.0), (30.0, 5.0)]);
    let mut db = WayDatabase::new(
        Config::default(),
        vec![Way::new("R1", geometry.clone(), Tags::empty())],
        &mut Timer::throwaway(),
    )
    .unwrap();

    let layer = vec![Way::new(
        "R1",
        geometry.clone(),
        tags(vec![("highway", "primary")]),
    )];
    let stats = db
        .insert_line_layer(&layer, "roads", &mut union, &mut Timer::throwaway())
        .unwrap();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.dropped, 0);

    let segs = &db.way_db[&Rlid::from("R1")];
    assert_eq!(segs.len(), 1);
    assert_eq!(db.segment_pts(&segs[0]), geometry);
    assert!(segs[0].tags.is("highway", "primary"));

    let reference = db.get_reference_geometry();
    assert_eq!(reference.len(), 1);
    assert_eq!(reference[0].pts, geometry);
}

#[test]
fn partial_layer_splits_the_segment_in_three() {
    abstutil::logger::setup_for_tests();
    let cfg = Config {
        perform_self_testing: true,
        ..Config::default()
    };
    let mut db = WayDatabase::new(
        cfg,
        vec![Way::new(
            "R1",
            pts(vec![(0.0, 0.0), (100.0, 0.0)]),
            Tags::empty(),
        )],
        &mut Timer::throwaway(),
    )
    .unwrap();

    let mut timer = Timer::throwaway();
    db.insert_line_layer(
        &[Way::new(
            "R1",
            pts(vec![(0.0, 0.0), (100.0, 0.0)]),
            tags(vec![("speed", "50")]),
        )],
        "speed limits",
        &mut union,
        &mut timer,
    )
    .unwrap();
    db.insert_line_layer(
        &[Way::new(
            "R1",
            pts(vec![(30.0, 0.0), (60.0, 0.0)]),
            tags(vec![("bridge", "yes")]),
        )],
        "bridges",
        &mut union,
        &mut timer,
    )
    .unwrap();

    assert_eq!(
        layout(&db, "R1"),
        vec![
            (
                Pt2D::new(0.0, 0.0),
                Pt2D::new(30.0, 0.0),
                tags(vec![("speed", "50")])
            ),
            (
                Pt2D::new(30.0, 0.0),
                Pt2D::new(60.0, 0.0),
                tags(vec![("speed", "50"), ("bridge", "yes")])
            ),
            (
                Pt2D::new(60.0, 0.0),
                Pt2D::new(100.0, 0.0),
                tags(vec![("speed", "50")])
            ),
        ]
    );
    check_dist_increases(&db);
    db.test_segments().unwrap();
}

#[test]
fn uncovered_stretches_stay_untagged() {
    abstutil::logger::setup_for_tests();
    let cfg = Config {
        perform_self_testing: true,
        ..Config::default()
    };
    let mut db = WayDatabase::new(
        cfg,
        vec![Way::new(
            "R1",
            pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]),
            Tags::empty(),
        )],
        &mut Timer::throwaway(),
    )
    .unwrap();

    let stats = db
        .insert_line_layer(
            &[Way::new(
                "R1",
                pts(vec![(5.0, 0.0), (15.0, 0.0)]),
                tags(vec![("speed", "50")]),
            )],
            "speed limits",
            &mut union,
            &mut Timer::throwaway(),
        )
        .unwrap();
    assert_eq!(stats.inserted, 1);

    assert_eq!(
        layout(&db, "R1"),
        vec![
            (Pt2D::new(0.0, 0.0), Pt2D::new(5.0, 0.0), Tags::empty()),
            (
                Pt2D::new(5.0, 0.0),
                Pt2D::new(15.0, 0.0),
                tags(vec![("speed", "50")])
            ),
            (Pt2D::new(15.0, 0.0), Pt2D::new(20.0, 0.0), Tags::empty()),
        ]
    );
    let segs = &db.way_db[&Rlid::from("R1")];
    assert_eq!(
        db.segment_pts(&segs[1]),
        pts(vec![(5.0, 0.0), (10.0, 0.0), (15.0, 0.0)])
    );
    check_dist_increases(&db);
    db.test_segments().unwrap();
}

#[test]
fn point_feature_is_spliced_into_segments() {
    abstutil::logger::setup_for_tests();
    let mut db = WayDatabase::new(
        Config::default(),
        vec![Way::new(
            "R1",
            pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]),
            Tags::empty(),
        )],
        &mut Timer::throwaway(),
    )
    .unwrap();
    let mut timer = Timer::throwaway();
    db.insert_line_layer(
        &[Way::new(
            "R1",
            pts(vec![(0.0, 0.0), (20.0, 0.0)]),
            tags(vec![("highway", "residential")]),
        )],
        "roads",
        &mut union,
        &mut timer,
    )
    .unwrap();

    let stats = db
        .insert_point_layer(
            &[
                PointFeature::new("R1", Pt2D::new(5.0, 0.05), tags(vec![("crossing", "zebra")])),
                PointFeature::new("R1", Pt2D::new(5.0, 30.0), tags(vec![("crossing", "no")])),
            ],
            "crossings",
            true,
            &mut union,
            &mut timer,
        )
        .unwrap();
    assert_eq!(stats.snapped, 1);
    assert_eq!(stats.unsnapped, 1);

    let spliced = Pt2D::new(5.0, 0.0);
    assert!(db.point_db[&spliced.to_hashable()][0]
        .tags
        .is("crossing", "zebra"));
    // The far one stays put
    assert!(db
        .point_db
        .contains_key(&Pt2D::new(5.0, 30.0).to_hashable()));

    let segs = &db.way_db[&Rlid::from("R1")];
    assert_eq!(
        db.segment_pts(&segs[0]),
        pts(vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (20.0, 0.0)])
    );
    check_dist_increases(&db);
}

#[test]
fn far_features_use_the_emergency_distance() {
    abstutil::logger::setup_for_tests();
    let mut db = WayDatabase::new(
        Config::default(),
        vec![Way::new(
            "R1",
            pts(vec![(0.0, 0.0), (50.0, 0.0)]),
            Tags::empty(),
        )],
        &mut Timer::throwaway(),
    )
    .unwrap();

    let mut timer = Timer::throwaway();
    let stats = db
        .insert_line_layer(
            &[
                // 3m off, between max_snap_distance and emergency_snap_distance
                Way::new(
                    "R1",
                    pts(vec![(10.0, 3.0), (40.0, 3.0)]),
                    tags(vec![("surface", "gravel")]),
                ),
                // Hopelessly far
                Way::new(
                    "R1",
                    pts(vec![(10.0, 20.0), (40.0, 20.0)]),
                    tags(vec![("surface", "dirt")]),
                ),
            ],
            "surface",
            &mut union,
            &mut timer,
        )
        .unwrap();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.emergency, 1);
    assert_eq!(stats.dropped, 1);
    assert!(!timer.warnings().is_empty());

    assert_eq!(
        layout(&db, "R1"),
        vec![
            (Pt2D::new(0.0, 0.0), Pt2D::new(10.0, 0.0), Tags::empty()),
            (
                Pt2D::new(10.0, 0.0),
                Pt2D::new(40.0, 0.0),
                tags(vec![("surface", "gravel")])
            ),
            (Pt2D::new(40.0, 0.0), Pt2D::new(50.0, 0.0), Tags::empty()),
        ]
    );
    assert_eq!(
        db.get_reference_geometry()[0].pts,
        pts(vec![(0.0, 0.0), (10.0, 0.0), (40.0, 0.0), (50.0, 0.0)])
    );
    check_dist_increases(&db);
}

#[test]
fn full_pipeline_keeps_crossings() {
    abstutil::logger::setup_for_tests();
    let cfg = Config::from_json(r#"{ "max_snap_distance": 3.0 }"#).unwrap();
    assert_eq!(cfg.max_snap_distance, 3.0);
    assert_eq!(cfg.point_snap_distance, Config::default().point_snap_distance);

    let a = pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
    let b = pts(vec![(10.0, -10.0), (10.0, 0.0), (10.0, 10.0)]);
    let mut timer = Timer::throwaway();
    let mut db = WayDatabase::new(
        cfg,
        vec![
            Way::new("A", a.clone(), Tags::empty()),
            Way::new("B", b.clone(), Tags::empty()),
        ],
        &mut timer,
    )
    .unwrap();
    db.insert_line_layer(
        &[
            Way::new("A", a.clone(), tags(vec![("highway", "primary")])),
            Way::new("B", b, tags(vec![("highway", "primary")])),
        ],
        "roads",
        &mut union,
        &mut timer,
    )
    .unwrap();

    db.run_maintenance_passes(true, &mut union, &mut timer)
        .unwrap();
    // Both pass straight through the junction, so nothing joins and the junction survives
    // simplification.
    assert_eq!(db.way_db.values().flatten().count(), 2);
    assert_eq!(db.segment_pts(&db.way_db[&Rlid::from("A")][0]), a);

    assert!(db.gs().is_none());
    db.setup_geometry_search(&mut timer).unwrap();
    let gs = db.gs().unwrap();
    let crossings = gs.find_crossing_points_within(Pt2D::new(10.0, 0.5), 1.0);
    assert_eq!(crossings.len(), 1);
    assert_eq!(crossings[0].0, Pt2D::new(10.0, 0.0));
    let rlids: Vec<Rlid> = crossings[0]
        .1
        .iter()
        .map(|id| db.segment(*id).unwrap().rlid.clone())
        .collect();
    assert_eq!(rlids, vec![Rlid::from("A"), Rlid::from("B")]);
    assert!(db.segment(SegmentId(2)).is_none());

    assert_eq!(db.get_endpoint_map().len(), 4);
}

#[test]
fn bad_config_is_rejected() {
    assert!(Config::from_json(r#"{ "point_snap_distance": 5.0 }"#).is_err());
    assert!(Config::from_json(r#"{ "max_segment_length": -1.0 }"#).is_err());
    assert!(WayDatabase::new(
        Config {
            emergency_snap_distance: 1.0,
            ..Config::default()
        },
        Vec::new(),
        &mut Timer::throwaway(),
    )
    .is_err());
}
