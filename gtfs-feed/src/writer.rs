use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Error;
use crate::feed::*;
use crate::objects::*;
use crate::serde_helpers::{format_color, format_date, format_time};

/// Writes a [Feed] back to a directory of .txt files or a zip archive.
/// Output rows are sorted for deterministic, diffable files; optional files
/// without any content are omitted
#[derive(Default)]
pub struct FeedWriter {}

struct CsvFile {
    name: &'static str,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl FeedWriter {
    /// Writes the feed to `path`; a `.zip` extension selects archive output
    pub fn write<P: AsRef<Path>>(&self, feed: &Feed, path: P) -> Result<(), Error> {
        let files = self.build_files(feed);
        let p = path.as_ref();

        if p.extension().map_or(false, |e| e == "zip") {
            let out = File::create(p)?;
            let mut zip = zip::ZipWriter::new(out);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for file in files {
                zip.start_file(file.name, options)?;
                let mut w = csv::Writer::from_writer(Vec::new());
                write_rows(&mut w, &file)?;
                let buf = w.into_inner().map_err(|e| Error::NamedFileIo {
                    file_name: file.name.to_owned(),
                    source: Box::new(e),
                })?;
                zip.write_all(&buf)?;
            }
            zip.finish()?;
        } else {
            std::fs::create_dir_all(p)?;
            for file in files {
                let mut w = csv::Writer::from_path(p.join(file.name)).map_err(|e| Error::NamedFileIo {
                    file_name: file.name.to_owned(),
                    source: Box::new(e),
                })?;
                write_rows(&mut w, &file)?;
            }
        }
        Ok(())
    }

    fn build_files(&self, feed: &Feed) -> Vec<CsvFile> {
        let mut files = vec![
            self.agencies(feed),
            self.stops(feed),
            self.routes(feed),
            self.trips(feed),
            self.stop_times(feed),
        ];

        for optional in [
            self.calendar(feed),
            self.calendar_dates(feed),
            self.shapes(feed),
            self.frequencies(feed),
            self.transfers(feed),
            self.pathways(feed),
            self.levels(feed),
            self.fare_attributes(feed),
            self.fare_rules(feed),
            self.attributions(feed),
        ]
        .into_iter()
        .flatten()
        {
            files.push(optional);
        }

        files
    }

    fn agencies(&self, feed: &Feed) -> CsvFile {
        let extra = extra_columns(&feed.extra.agencies);
        let mut rows: Vec<Vec<String>> = feed
            .agencies
            .values()
            .map(|a| {
                let mut row = vec![
                    opt(&a.id),
                    a.name.clone(),
                    a.url.clone(),
                    a.timezone.clone(),
                    opt(&a.lang),
                    opt(&a.phone),
                    opt(&a.fare_url),
                    opt(&a.email),
                ];
                push_extras(&mut row, &feed.extra.agencies, &extra, a.id());
                row
            })
            .collect();
        rows.sort();
        CsvFile {
            name: "agency.txt",
            headers: with_extra(Agency::FIELDS, &extra),
            rows,
        }
    }

    fn stops(&self, feed: &Feed) -> CsvFile {
        let extra = extra_columns(&feed.extra.stops);
        let mut rows: Vec<Vec<String>> = feed
            .stops
            .values()
            .map(|s| {
                let mut row = vec![
                    s.id.clone(),
                    opt(&s.code),
                    s.name.clone(),
                    s.description.clone(),
                    opt_num(&s.latitude),
                    opt_num(&s.longitude),
                    opt(&s.zone_id),
                    opt(&s.url),
                    s.location_type.value().to_string(),
                    opt(&s.parent_station),
                    opt(&s.timezone),
                    s.wheelchair_boarding.value().to_string(),
                    opt(&s.level_id),
                    opt(&s.platform_code),
                ];
                push_extras(&mut row, &feed.extra.stops, &extra, &s.id);
                row
            })
            .collect();
        rows.sort();
        CsvFile {
            name: "stops.txt",
            headers: with_extra(Stop::FIELDS, &extra),
            rows,
        }
    }

    fn routes(&self, feed: &Feed) -> CsvFile {
        let extra = extra_columns(&feed.extra.routes);
        let mut rows: Vec<Vec<String>> = feed
            .routes
            .values()
            .map(|r| {
                let mut row = vec![
                    r.id.clone(),
                    opt(&r.agency_id),
                    r.short_name.clone(),
                    r.long_name.clone(),
                    r.desc.clone(),
                    r.route_type.to_string(),
                    opt(&r.url),
                    format_color(&r.color),
                    format_color(&r.text_color),
                    opt_num(&r.sort_order),
                    r.continuous_pickup.value().to_string(),
                    r.continuous_drop_off.value().to_string(),
                ];
                push_extras(&mut row, &feed.extra.routes, &extra, &r.id);
                row
            })
            .collect();
        rows.sort();
        CsvFile {
            name: "routes.txt",
            headers: with_extra(Route::FIELDS, &extra),
            rows,
        }
    }

    fn trips(&self, feed: &Feed) -> CsvFile {
        let extra = extra_columns(&feed.extra.trips);
        let mut rows: Vec<Vec<String>> = feed
            .trips
            .values()
            .map(|t| {
                let mut row = vec![
                    t.id.clone(),
                    t.route_id.clone(),
                    t.service_id.clone(),
                    opt(&t.headsign),
                    opt(&t.short_name),
                    t.direction_id.map_or(String::new(), |d| d.value().to_string()),
                    opt(&t.block_id),
                    opt(&t.shape_id),
                    t.wheelchair_accessible.value().to_string(),
                    t.bikes_allowed.value().to_string(),
                ];
                push_extras(&mut row, &feed.extra.trips, &extra, &t.id);
                row
            })
            .collect();
        rows.sort();
        CsvFile {
            name: "trips.txt",
            headers: with_extra(RawTrip::FIELDS, &extra),
            rows,
        }
    }

    fn stop_times(&self, feed: &Feed) -> CsvFile {
        let mut extra: Vec<String> = feed.extra.stop_times.keys().cloned().collect();
        extra.sort();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for trip in feed.trips.values() {
            for st in &trip.stop_times {
                let mut row = vec![
                    trip.id.clone(),
                    st.arrival_time.map_or(String::new(), format_time),
                    st.departure_time.map_or(String::new(), format_time),
                    st.stop_id.clone(),
                    st.sequence.to_string(),
                    opt(&st.headsign),
                    st.pickup_type.value().to_string(),
                    st.drop_off_type.value().to_string(),
                    st.continuous_pickup.value().to_string(),
                    st.continuous_drop_off.value().to_string(),
                    st.shape_dist_traveled.map_or(String::new(), |d| d.to_string()),
                    st.timepoint.value().to_string(),
                ];
                for col in &extra {
                    row.push(
                        feed.extra.stop_times[col]
                            .get(&(trip.id.clone(), st.sequence))
                            .cloned()
                            .unwrap_or_default(),
                    );
                }
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| {
            (&a[0], a[4].parse::<u32>().unwrap_or(0)).cmp(&(&b[0], b[4].parse::<u32>().unwrap_or(0)))
        });
        let mut headers: Vec<String> = RawStopTime::FIELDS.iter().map(|s| s.to_string()).collect();
        headers.extend(extra);
        CsvFile {
            name: "stop_times.txt",
            headers,
            rows,
        }
    }

    fn calendar(&self, feed: &Feed) -> Option<CsvFile> {
        let mut rows: Vec<Vec<String>> = feed
            .services
            .values()
            .filter(|s| s.weekdays != 0)
            .filter_map(|s| {
                let (start, end) = (s.start_date?, s.end_date?);
                let mut row = vec![s.id.clone()];
                for i in 0..7 {
                    row.push(if s.weekday(i) { "1" } else { "0" }.to_string());
                }
                row.push(format_date(&start));
                row.push(format_date(&end));
                Some(row)
            })
            .collect();
        if rows.is_empty() {
            return None;
        }
        rows.sort();
        Some(CsvFile {
            name: "calendar.txt",
            headers: [
                "service_id",
                "monday",
                "tuesday",
                "wednesday",
                "thursday",
                "friday",
                "saturday",
                "sunday",
                "start_date",
                "end_date",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rows,
        })
    }

    fn calendar_dates(&self, feed: &Feed) -> Option<CsvFile> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for s in feed.services.values() {
            for (date, added) in &s.exceptions {
                rows.push(vec![
                    s.id.clone(),
                    format_date(date),
                    if *added { "1" } else { "2" }.to_string(),
                ]);
            }
        }
        if rows.is_empty() {
            return None;
        }
        rows.sort();
        Some(CsvFile {
            name: "calendar_dates.txt",
            headers: ["service_id", "date", "exception_type"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        })
    }

    fn shapes(&self, feed: &Feed) -> Option<CsvFile> {
        if feed.shapes.is_empty() {
            return None;
        }
        let extra = extra_columns(&feed.extra.shapes);
        let mut rows: Vec<Vec<String>> = Vec::new();
        for shape in feed.shapes.values() {
            for p in &shape.points {
                let mut row = vec![
                    shape.id.clone(),
                    p.lat.to_string(),
                    p.lon.to_string(),
                    p.sequence.to_string(),
                    p.dist_traveled.map_or(String::new(), |d| d.to_string()),
                ];
                push_extras(&mut row, &feed.extra.shapes, &extra, &shape.id);
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| {
            (&a[0], a[3].parse::<u32>().unwrap_or(0)).cmp(&(&b[0], b[3].parse::<u32>().unwrap_or(0)))
        });
        Some(CsvFile {
            name: "shapes.txt",
            headers: with_extra(RawShapePoint::FIELDS, &extra),
            rows,
        })
    }

    fn frequencies(&self, feed: &Feed) -> Option<CsvFile> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for trip in feed.trips.values() {
            for f in &trip.frequencies {
                rows.push(vec![
                    trip.id.clone(),
                    format_time(f.start_time),
                    format_time(f.end_time),
                    f.headway_secs.to_string(),
                    if f.exact_times { "1" } else { "0" }.to_string(),
                ]);
            }
        }
        if rows.is_empty() {
            return None;
        }
        rows.sort();
        Some(CsvFile {
            name: "frequencies.txt",
            headers: ["trip_id", "start_time", "end_time", "headway_secs", "exact_times"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        })
    }

    fn transfers(&self, feed: &Feed) -> Option<CsvFile> {
        if feed.transfers.is_empty() {
            return None;
        }
        let mut rows: Vec<Vec<String>> = feed
            .transfers
            .iter()
            .map(|(k, t)| {
                vec![
                    k.from_stop_id.clone(),
                    k.to_stop_id.clone(),
                    opt(&k.from_route_id),
                    opt(&k.to_route_id),
                    opt(&k.from_trip_id),
                    opt(&k.to_trip_id),
                    t.transfer_type.value().to_string(),
                    opt_num(&t.min_transfer_time),
                ]
            })
            .collect();
        rows.sort();
        Some(CsvFile {
            name: "transfers.txt",
            headers: [
                "from_stop_id",
                "to_stop_id",
                "from_route_id",
                "to_route_id",
                "from_trip_id",
                "to_trip_id",
                "transfer_type",
                "min_transfer_time",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rows,
        })
    }

    fn pathways(&self, feed: &Feed) -> Option<CsvFile> {
        if feed.pathways.is_empty() {
            return None;
        }
        let extra = extra_columns(&feed.extra.pathways);
        let mut rows: Vec<Vec<String>> = feed
            .pathways
            .values()
            .map(|p| {
                let mut row = vec![
                    p.id.clone(),
                    p.from_stop_id.clone(),
                    p.to_stop_id.clone(),
                    p.mode.value().to_string(),
                    p.is_bidirectional.to_string(),
                    p.length.map_or(String::new(), |v| v.to_string()),
                    opt_num(&p.traversal_time),
                    p.stair_count.map_or(String::new(), |v| v.to_string()),
                    p.max_slope.map_or(String::new(), |v| v.to_string()),
                    p.min_width.map_or(String::new(), |v| v.to_string()),
                    opt(&p.signposted_as),
                    opt(&p.reversed_signposted_as),
                ];
                push_extras(&mut row, &feed.extra.pathways, &extra, &p.id);
                row
            })
            .collect();
        rows.sort();
        Some(CsvFile {
            name: "pathways.txt",
            headers: with_extra(Pathway::FIELDS, &extra),
            rows,
        })
    }

    fn levels(&self, feed: &Feed) -> Option<CsvFile> {
        if feed.levels.is_empty() {
            return None;
        }
        let extra = extra_columns(&feed.extra.levels);
        let mut rows: Vec<Vec<String>> = feed
            .levels
            .values()
            .map(|l| {
                let mut row = vec![l.id.clone(), l.index.to_string(), opt(&l.name)];
                push_extras(&mut row, &feed.extra.levels, &extra, &l.id);
                row
            })
            .collect();
        rows.sort();
        Some(CsvFile {
            name: "levels.txt",
            headers: with_extra(Level::FIELDS, &extra),
            rows,
        })
    }

    fn fare_attributes(&self, feed: &Feed) -> Option<CsvFile> {
        if feed.fare_attributes.is_empty() {
            return None;
        }
        let extra = extra_columns(&feed.extra.fare_attributes);
        let mut rows: Vec<Vec<String>> = feed
            .fare_attributes
            .values()
            .map(|f| {
                let mut row = vec![
                    f.id.clone(),
                    f.price.clone(),
                    f.currency.clone(),
                    f.payment_method.value().to_string(),
                    f.transfers.value().map_or(String::new(), |v| v.to_string()),
                    opt(&f.agency_id),
                    opt_num(&f.transfer_duration),
                ];
                push_extras(&mut row, &feed.extra.fare_attributes, &extra, &f.id);
                row
            })
            .collect();
        rows.sort();
        Some(CsvFile {
            name: "fare_attributes.txt",
            headers: with_extra(RawFareAttribute::FIELDS, &extra),
            rows,
        })
    }

    fn fare_rules(&self, feed: &Feed) -> Option<CsvFile> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for fare in feed.fare_attributes.values() {
            for rule in &fare.rules {
                rows.push(vec![
                    fare.id.clone(),
                    opt(&rule.route_id),
                    opt(&rule.origin_id),
                    opt(&rule.destination_id),
                    opt(&rule.contains_id),
                ]);
            }
        }
        if rows.is_empty() {
            return None;
        }
        rows.sort();
        Some(CsvFile {
            name: "fare_rules.txt",
            headers: ["fare_id", "route_id", "origin_id", "destination_id", "contains_id"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        })
    }

    fn attributions(&self, feed: &Feed) -> Option<CsvFile> {
        let mut attributions: Vec<&Attribution> = feed.attributions.iter().collect();
        for agency in feed.agencies.values() {
            attributions.extend(agency.attributions.iter());
        }
        for route in feed.routes.values() {
            attributions.extend(route.attributions.iter());
        }
        for trip in feed.trips.values() {
            attributions.extend(trip.attributions.iter());
        }
        if attributions.is_empty() {
            return None;
        }
        let mut rows: Vec<Vec<String>> = attributions
            .iter()
            .map(|a| {
                vec![
                    opt(&a.id),
                    opt(&a.agency_id),
                    opt(&a.route_id),
                    opt(&a.trip_id),
                    a.organization_name.clone(),
                    opt_bool(&a.is_producer),
                    opt_bool(&a.is_operator),
                    opt_bool(&a.is_authority),
                    opt(&a.attribution_url),
                    opt(&a.attribution_email),
                    opt(&a.attribution_phone),
                ]
            })
            .collect();
        rows.sort();
        rows.dedup();
        Some(CsvFile {
            name: "attributions.txt",
            headers: [
                "attribution_id",
                "agency_id",
                "route_id",
                "trip_id",
                "organization_name",
                "is_producer",
                "is_operator",
                "is_authority",
                "attribution_url",
                "attribution_email",
                "attribution_phone",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rows,
        })
    }
}

fn write_rows<W: std::io::Write>(w: &mut csv::Writer<W>, file: &CsvFile) -> Result<(), Error> {
    let io_err = |e: csv::Error| Error::NamedFileIo {
        file_name: file.name.to_owned(),
        source: Box::new(e),
    };
    w.write_record(&file.headers).map_err(io_err)?;
    for row in &file.rows {
        w.write_record(row).map_err(io_err)?;
    }
    w.flush()?;
    Ok(())
}

fn opt(o: &Option<String>) -> String {
    o.clone().unwrap_or_default()
}

fn opt_num<T: ToString>(o: &Option<T>) -> String {
    o.as_ref().map_or(String::new(), |v| v.to_string())
}

fn opt_bool(o: &Option<bool>) -> String {
    o.map_or(String::new(), |v| if v { "1" } else { "0" }.to_string())
}

fn extra_columns<V>(table: &HashMap<String, V>) -> Vec<String> {
    let mut cols: Vec<String> = table.keys().cloned().collect();
    cols.sort();
    cols
}

fn with_extra(std_fields: &[&str], extra: &[String]) -> Vec<String> {
    let mut headers: Vec<String> = std_fields.iter().map(|s| s.to_string()).collect();
    headers.extend(extra.iter().cloned());
    headers
}

fn push_extras(row: &mut Vec<String>, table: &ExtraTable, cols: &[String], id: &str) {
    for col in cols {
        row.push(
            table
                .get(col)
                .and_then(|c| c.get(id))
                .cloned()
                .unwrap_or_default(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::FeedReader;

    #[test]
    fn written_feed_reads_back_equivalent() {
        let mut feed = Feed::new();
        feed.agencies.insert(
            "A".into(),
            Agency {
                id: Some("A".into()),
                name: "Demo".into(),
                url: "http://example.com".into(),
                timezone: "Europe/Berlin".into(),
                ..Default::default()
            },
        );
        feed.stops.insert(
            "S1".into(),
            Stop {
                id: "S1".into(),
                name: "First".into(),
                latitude: Some(48.0),
                longitude: Some(7.8),
                ..Default::default()
            },
        );
        feed.routes.insert(
            "R".into(),
            Route {
                id: "R".into(),
                agency_id: Some("A".into()),
                short_name: "1".into(),
                route_type: 3,
                color: crate::serde_helpers::default_route_color(),
                ..Default::default()
            },
        );
        let mut service = Service::new("SV".to_string());
        service.weekdays = 0b0011111;
        service.start_date = chrono::NaiveDate::from_ymd_opt(2020, 1, 6);
        service.end_date = chrono::NaiveDate::from_ymd_opt(2020, 6, 28);
        service
            .exceptions
            .insert(chrono::NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(), false);
        feed.services.insert("SV".into(), service);
        feed.trips.insert(
            "T1".into(),
            Trip {
                id: "T1".into(),
                route_id: "R".into(),
                service_id: "SV".into(),
                stop_times: vec![
                    StopTime {
                        stop_id: "S1".into(),
                        arrival_time: Some(8 * 3600),
                        departure_time: Some(8 * 3600),
                        sequence: 0,
                        ..Default::default()
                    },
                    StopTime {
                        stop_id: "S1".into(),
                        arrival_time: Some(9 * 3600),
                        departure_time: Some(9 * 3600),
                        sequence: 1,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        );
        feed.extra
            .trips
            .entry("vehicle_class".into())
            .or_default()
            .insert("T1".into(), "articulated".into());

        let dir = std::env::temp_dir().join("gtfs_feed_writer_test");
        std::fs::remove_dir_all(&dir).ok();
        FeedWriter::default().write(&feed, &dir).unwrap();

        let reread = FeedReader::default().read(&dir).unwrap();
        assert_eq!(reread.agencies.len(), 1);
        assert_eq!(reread.trips["T1"].stop_times.len(), 2);
        assert_eq!(
            reread.trips["T1"].stop_times[0].departure_time,
            Some(8 * 3600)
        );
        let sv = &reread.services["SV"];
        assert_eq!(sv.weekdays, 0b0011111);
        assert_eq!(sv.exceptions.len(), 1);
        assert_eq!(
            reread.extra.trips["vehicle_class"].get("T1"),
            Some(&"articulated".to_string())
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
