//! End-to-end checks running several processors in pipeline order against
//! small hand-built feeds.

use gtfs_feed::{Feed, FeedReader, FeedWriter};

use super::testutil::*;
use super::*;

/// Four identical runs every ten minutes collapse, via trip dedup and the
/// frequency search, into a single template trip with one frequency row
#[test]
fn equidistant_trips_end_up_as_one_frequency_backed_trip() {
    let mut feed = Feed::new();
    feed.stops
        .insert("BEATTY_AIRPORT".into(), stop("BEATTY_AIRPORT", 36.868, -116.784));
    feed.stops
        .insert("BULLFROG".into(), stop("BULLFROG", 36.881, -116.818));
    feed.routes.insert("AB".into(), route("AB"));
    feed.services.insert(
        "FULLW".into(),
        daily_service("FULLW", date(2016, 1, 1), date(2016, 12, 31)),
    );

    for (i, dep) in [28800u32, 29400, 30000, 30600].iter().enumerate() {
        let id = format!("AB1{}", (b'a' + i as u8) as char);
        feed.trips.insert(
            id.clone(),
            trip(
                &id,
                "AB",
                "FULLW",
                vec![
                    stop_time("BEATTY_AIRPORT", 1, *dep, *dep),
                    stop_time("BULLFROG", 2, dep + 900, dep + 900),
                ],
            ),
        );
    }

    TripDuplicateRemover::default().run(&mut feed);
    assert_eq!(feed.trips.len(), 4, "distinct times are not duplicates");

    FrequencyMinimizer::default().run(&mut feed);

    assert_eq!(feed.trips.len(), 1);
    let survivor = feed.trips.values().next().unwrap();
    assert_eq!(survivor.id, "AB1a");
    assert_eq!(survivor.stop_times[0].departure_time, Some(28800)); // 08:00
    assert_eq!(survivor.stop_times[1].arrival_time, Some(29700)); // 08:15
    assert_eq!(survivor.frequencies.len(), 1);
    let f = &survivor.frequencies[0];
    assert_eq!(
        (f.start_time, f.end_time, f.headway_secs, f.exact_times),
        (28800, 31200, 600, true) // 08:00, 08:40, 600 s, exact
    );
    feed.check_references().unwrap();
}

/// A stop at exactly (0, 0) is dropped under the null-coordinate check,
/// and the trip whose stop times reference it goes with it
#[test]
fn null_island_stops_cascade_into_their_trips() {
    use std::io::Write;

    let dir = std::env::temp_dir().join("feedslim_null_island_test");
    std::fs::create_dir_all(&dir).unwrap();
    let files: &[(&str, &str)] = &[
        (
            "agency.txt",
            "agency_id,agency_name,agency_url,agency_timezone\nA,Demo,http://example.com,UTC\n",
        ),
        (
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\nGOOD,Good,36.4,-117.1\nNULL,Null,0,0\n",
        ),
        (
            "routes.txt",
            "route_id,route_short_name,route_long_name,route_type\nR,10,,3\n",
        ),
        (
            "trips.txt",
            "route_id,service_id,trip_id\nR,SV,OK\nR,SV,BROKEN\n",
        ),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\nOK,08:00:00,08:00:00,GOOD,0\nBROKEN,08:00:00,08:00:00,NULL,0\n",
        ),
        (
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\nSV,1,1,1,1,1,1,1,20200101,20201231\n",
        ),
    ];
    for (name, content) in files {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    // without dropping, the null coordinate is a hard error
    let strict = FeedReader::default().check_null_coordinates(true).read(&dir);
    assert!(strict.is_err());

    let feed = FeedReader::default()
        .check_null_coordinates(true)
        .drop_erroneous(true)
        .read(&dir)
        .unwrap();
    assert!(!feed.stops.contains_key("NULL"));
    assert!(!feed.trips.contains_key("BROKEN"));
    assert!(feed.trips.contains_key("OK"));
    feed.check_references().unwrap();

    std::fs::remove_dir_all(&dir).ok();
}

/// The full compress pipeline preserves the served schedule through a
/// write-read cycle
#[test]
fn compressed_feed_round_trips_with_the_same_schedule() {
    let mut feed = Feed::new();
    feed.stops.insert("A".into(), stop("A", 48.0, 7.8));
    feed.stops.insert("B".into(), stop("B", 48.02, 7.83));
    feed.stops.insert("UNUSED".into(), stop("UNUSED", 49.0, 9.0));
    feed.routes.insert("R1".into(), route("R1"));
    feed.routes.insert("R2".into(), route("R2")); // equal to R1
    feed.services.insert(
        "SV1".into(),
        daily_service("SV1", date(2020, 1, 6), date(2020, 6, 28)),
    );
    let mut sv2 = daily_service("SV2", date(2020, 1, 6), date(2020, 6, 28));
    sv2.exceptions.insert(date(2020, 1, 6), true); // redundant
    feed.services.insert("SV2".into(), sv2);

    feed.trips.insert(
        "T1".into(),
        trip(
            "T1",
            "R1",
            "SV1",
            vec![stop_time("A", 0, 28800, 28800), stop_time("B", 1, 29700, 29700)],
        ),
    );
    feed.trips.insert(
        "T2".into(),
        trip(
            "T2",
            "R2",
            "SV2",
            vec![stop_time("A", 0, 28800, 28800), stop_time("B", 1, 29700, 29700)],
        ),
    );

    let check_day = date(2020, 3, 4);
    let served_before: Vec<(String, u32, u32)> = schedule_on(&feed, check_day);

    for processor in [
        Box::new(OrphanRemover {}) as Box<dyn Processor>,
        Box::new(AgencyDuplicateRemover {}),
        Box::new(RouteDuplicateRemover {}),
        Box::new(ServiceDuplicateRemover {}),
        Box::new(ServiceMinimizer {}),
        Box::new(StopDuplicateRemover::default()),
        Box::new(TripDuplicateRemover::default()),
    ] {
        processor.run(&mut feed);
    }

    assert_eq!(feed.routes.len(), 1);
    assert_eq!(feed.services.len(), 1);
    assert_eq!(feed.trips.len(), 1);
    assert!(!feed.stops.contains_key("UNUSED"));
    feed.check_references().unwrap();

    let dir = std::env::temp_dir().join("feedslim_roundtrip_test");
    std::fs::remove_dir_all(&dir).ok();
    FeedWriter::default().write(&feed, &dir).unwrap();
    let reread = FeedReader::default().read(&dir).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    let served_after = schedule_on(&reread, check_day);
    assert_eq!(served_before.len(), 2);
    assert_eq!(served_after.len(), 1);
    // the surviving run serves the same stations at the same times
    assert_eq!(served_before[0].1, served_after[0].1);
    assert_eq!(served_before[0].2, served_after[0].2);
}

/// All (first station, departure, arrival) triples served on a date
fn schedule_on(feed: &Feed, day: chrono::NaiveDate) -> Vec<(String, u32, u32)> {
    let mut ret: Vec<(String, u32, u32)> = feed
        .trips
        .values()
        .filter(|t| feed.services[&t.service_id].is_active_on(day))
        .map(|t| {
            (
                feed.station_of(&t.stop_times[0].stop_id).to_string(),
                t.stop_times[0].departure_time.unwrap(),
                t.stop_times[t.stop_times.len() - 1].arrival_time.unwrap(),
            )
        })
        .collect();
    ret.sort();
    ret
}
