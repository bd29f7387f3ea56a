use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, LineError};
use crate::feed::*;
use crate::objects::*;

/// Parameterizes how the feed is read and how erroneous input is handled
///
/// ```no_run
///let feed = gtfs_feed::FeedReader::default()
///    .drop_erroneous(true)
///    .check_null_coordinates(true)
///    .read("gtfs.zip")?;
/// # Ok::<(), gtfs_feed::Error>(())
///```
#[derive(Derivative)]
#[derivative(Default)]
pub struct FeedReader {
    /// Skip rows that cannot be parsed or that reference unknown entities,
    /// instead of aborting. A stop time referencing a dropped stop takes its
    /// whole trip with it
    #[derivative(Default(value = "false"))]
    pub drop_erroneous: bool,
    /// Replace unknown enumeration values by their field defaults
    #[derivative(Default(value = "false"))]
    pub default_on_error: bool,
    /// Treat stops at exactly (0, 0) as erroneous
    #[derivative(Default(value = "false"))]
    pub check_null_coordinates: bool,
    /// Replacement for empty required name fields (stop_name, agency_name)
    #[derivative(Default(value = "None"))]
    pub empty_string_replacement: Option<String>,
    /// Trim whitespace around fields. Costs time; can be disabled for
    /// high-quality data
    #[derivative(Default(value = "true"))]
    pub trim_fields: bool,
}

/// One parsed CSV table: typed records plus, per record, the values of any
/// non-standard columns
struct Table<O> {
    records: Vec<O>,
    extras: Vec<Vec<(String, String)>>,
}

impl<O> Table<O> {
    fn empty() -> Self {
        Table {
            records: Vec::new(),
            extras: Vec::new(),
        }
    }
}

struct RawParts {
    agencies: Table<Agency>,
    stops: Table<Stop>,
    routes: Table<Route>,
    trips: Table<RawTrip>,
    stop_times: Table<RawStopTime>,
    shapes: Option<Table<RawShapePoint>>,
    calendar: Option<Table<Calendar>>,
    calendar_dates: Option<Table<CalendarDate>>,
    frequencies: Option<Table<RawFrequency>>,
    transfers: Option<Table<RawTransfer>>,
    pathways: Option<Table<Pathway>>,
    levels: Option<Table<Level>>,
    fare_attributes: Option<Table<RawFareAttribute>>,
    fare_rules: Option<Table<FareRule>>,
    attributions: Option<Table<Attribution>>,
}

impl FeedReader {
    pub fn drop_erroneous(mut self, drop_erroneous: bool) -> Self {
        self.drop_erroneous = drop_erroneous;
        self
    }

    pub fn default_on_error(mut self, default_on_error: bool) -> Self {
        self.default_on_error = default_on_error;
        self
    }

    pub fn check_null_coordinates(mut self, check: bool) -> Self {
        self.check_null_coordinates = check;
        self
    }

    pub fn empty_string_replacement(mut self, repl: Option<String>) -> Self {
        self.empty_string_replacement = repl;
        self
    }

    pub fn trim_fields(mut self, trim_fields: bool) -> Self {
        self.trim_fields = trim_fields;
        self
    }

    /// Reads a feed from a local path, either a directory of .txt files or
    /// a zip archive
    pub fn read<P>(&self, path: P) -> Result<Feed, Error>
    where
        P: AsRef<Path>,
    {
        let p = path.as_ref();
        if p.is_file() {
            let reader = File::open(p)?;
            self.read_from_reader(reader)
        } else if p.is_dir() {
            self.read_from_directory(p)
        } else {
            Err(Error::NotFileNorDirectory(format!("{}", p.display())))
        }
    }

    fn read_from_directory(&self, p: &Path) -> Result<Feed, Error> {
        let parts = RawParts {
            agencies: self.read_file_from_path(p, "agency.txt", Agency::FIELDS)?,
            stops: self.read_file_from_path(p, "stops.txt", Stop::FIELDS)?,
            routes: self.read_file_from_path(p, "routes.txt", Route::FIELDS)?,
            trips: self.read_file_from_path(p, "trips.txt", RawTrip::FIELDS)?,
            stop_times: self.read_file_from_path(p, "stop_times.txt", RawStopTime::FIELDS)?,
            shapes: self.read_optional_from_path(p, "shapes.txt", RawShapePoint::FIELDS)?,
            calendar: self.read_optional_from_path(p, "calendar.txt", &[])?,
            calendar_dates: self.read_optional_from_path(p, "calendar_dates.txt", &[])?,
            frequencies: self.read_optional_from_path(p, "frequencies.txt", &[])?,
            transfers: self.read_optional_from_path(p, "transfers.txt", &[])?,
            pathways: self.read_optional_from_path(p, "pathways.txt", Pathway::FIELDS)?,
            levels: self.read_optional_from_path(p, "levels.txt", Level::FIELDS)?,
            fare_attributes: self.read_optional_from_path(
                p,
                "fare_attributes.txt",
                RawFareAttribute::FIELDS,
            )?,
            fare_rules: self.read_optional_from_path(p, "fare_rules.txt", &[])?,
            attributions: self.read_optional_from_path(p, "attributions.txt", &[])?,
        };
        self.link(parts)
    }

    /// Reads a zipped feed from any seekable reader
    pub fn read_from_reader<T: Read + std::io::Seek>(&self, reader: T) -> Result<Feed, Error> {
        let mut hasher = Sha256::new();
        let mut buf_reader = std::io::BufReader::new(reader);
        std::io::copy(&mut buf_reader, &mut hasher)?;
        log::debug!("feed archive sha256: {:x}", hasher.finalize());

        let mut archive = zip::ZipArchive::new(buf_reader)?;
        let mut file_mapping = HashMap::new();

        for i in 0..archive.len() {
            let name = archive.by_index(i)?.name().to_owned();
            if let Some(base) = Path::new(&name).file_name().and_then(|f| f.to_str()) {
                file_mapping.entry(base.to_string()).or_insert(i);
            }
        }

        let parts = RawParts {
            agencies: self.read_file_from_zip(&mut archive, &file_mapping, "agency.txt", Agency::FIELDS)?,
            stops: self.read_file_from_zip(&mut archive, &file_mapping, "stops.txt", Stop::FIELDS)?,
            routes: self.read_file_from_zip(&mut archive, &file_mapping, "routes.txt", Route::FIELDS)?,
            trips: self.read_file_from_zip(&mut archive, &file_mapping, "trips.txt", RawTrip::FIELDS)?,
            stop_times: self.read_file_from_zip(
                &mut archive,
                &file_mapping,
                "stop_times.txt",
                RawStopTime::FIELDS,
            )?,
            shapes: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "shapes.txt",
                RawShapePoint::FIELDS,
            )?,
            calendar: self.read_optional_from_zip(&mut archive, &file_mapping, "calendar.txt", &[])?,
            calendar_dates: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "calendar_dates.txt",
                &[],
            )?,
            frequencies: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "frequencies.txt",
                &[],
            )?,
            transfers: self.read_optional_from_zip(&mut archive, &file_mapping, "transfers.txt", &[])?,
            pathways: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "pathways.txt",
                Pathway::FIELDS,
            )?,
            levels: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "levels.txt",
                Level::FIELDS,
            )?,
            fare_attributes: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "fare_attributes.txt",
                RawFareAttribute::FIELDS,
            )?,
            fare_rules: self.read_optional_from_zip(&mut archive, &file_mapping, "fare_rules.txt", &[])?,
            attributions: self.read_optional_from_zip(
                &mut archive,
                &file_mapping,
                "attributions.txt",
                &[],
            )?,
        };
        self.link(parts)
    }

    fn read_file_from_path<O: DeserializeOwned>(
        &self,
        dir: &Path,
        file_name: &str,
        std_fields: &[&str],
    ) -> Result<Table<O>, Error> {
        match self.read_optional_from_path(dir, file_name, std_fields)? {
            Some(t) => Ok(t),
            None => Err(Error::MissingFile(file_name.to_owned())),
        }
    }

    fn read_optional_from_path<O: DeserializeOwned>(
        &self,
        dir: &Path,
        file_name: &str,
        std_fields: &[&str],
    ) -> Result<Option<Table<O>>, Error> {
        match File::open(dir.join(file_name)) {
            Ok(f) => self.read_objs(f, file_name, std_fields).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn read_file_from_zip<O: DeserializeOwned, T: Read + std::io::Seek>(
        &self,
        archive: &mut zip::ZipArchive<T>,
        mapping: &HashMap<String, usize>,
        file_name: &str,
        std_fields: &[&str],
    ) -> Result<Table<O>, Error> {
        match self.read_optional_from_zip(archive, mapping, file_name, std_fields)? {
            Some(t) => Ok(t),
            None => Err(Error::MissingFile(file_name.to_owned())),
        }
    }

    fn read_optional_from_zip<O: DeserializeOwned, T: Read + std::io::Seek>(
        &self,
        archive: &mut zip::ZipArchive<T>,
        mapping: &HashMap<String, usize>,
        file_name: &str,
        std_fields: &[&str],
    ) -> Result<Option<Table<O>>, Error> {
        let Some(&i) = mapping.get(file_name) else {
            return Ok(None);
        };
        let file = archive.by_index(i).map_err(|e| Error::NamedFileIo {
            file_name: file_name.to_owned(),
            source: Box::new(e),
        })?;
        self.read_objs(file, file_name, std_fields).map(Some)
    }

    fn read_objs<O, T>(&self, mut reader: T, file_name: &str, std_fields: &[&str]) -> Result<Table<O>, Error>
    where
        O: DeserializeOwned,
        T: Read,
    {
        let mut bom = [0; 3];
        reader.read_exact(&mut bom).map_err(|e| Error::NamedFileIo {
            file_name: file_name.to_owned(),
            source: Box::new(e),
        })?;

        let chained = if bom != [0xef, 0xbb, 0xbf] {
            bom.chain(reader)
        } else {
            [].chain(reader)
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(if self.trim_fields {
                csv::Trim::Fields
            } else {
                csv::Trim::None
            })
            .from_reader(chained);

        let csv_error = |file_name: &str, e: csv::Error, line: Option<LineError>| Error::Csv {
            file_name: file_name.to_owned(),
            source: e,
            line_in_error: line,
        };

        // headers are kept to report them on row errors
        let headers = reader
            .headers()
            .map_err(|e| csv_error(file_name, e, None))?
            .clone();

        // columns not covered by the typed record are carried through verbatim
        let extra_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !std_fields.is_empty() && !std_fields.contains(h))
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut rec = csv::StringRecord::new();
        let mut table = Table::empty();
        let mut dropped = 0usize;

        while reader
            .read_record(&mut rec)
            .map_err(|e| csv_error(file_name, e, None))?
        {
            match rec.deserialize::<O>(Some(&headers)) {
                Ok(obj) => {
                    let extras = extra_cols
                        .iter()
                        .filter_map(|(i, name)| {
                            rec.get(*i)
                                .filter(|v| !v.is_empty())
                                .map(|v| (name.clone(), v.to_string()))
                        })
                        .collect();
                    table.records.push(obj);
                    table.extras.push(extras);
                }
                Err(e) => {
                    if self.drop_erroneous {
                        dropped += 1;
                        log::warn!("dropping unparseable row in {}: {}", file_name, e);
                    } else {
                        return Err(csv_error(
                            file_name,
                            e,
                            Some(LineError {
                                headers: headers.iter().map(String::from).collect(),
                                values: rec.iter().map(String::from).collect(),
                            }),
                        ));
                    }
                }
            }
        }

        if dropped > 0 {
            log::info!("{}: dropped {} erroneous rows", file_name, dropped);
        }
        Ok(table)
    }

    fn link(&self, mut parts: RawParts) -> Result<Feed, Error> {
        if parts.calendar.is_none() && parts.calendar_dates.is_none() {
            return Err(Error::MissingFile("calendar.txt".to_owned()));
        }

        if self.default_on_error {
            unknown_to_default(&mut parts);
        }
        if let Some(repl) = &self.empty_string_replacement {
            for a in &mut parts.agencies.records {
                if a.name.is_empty() {
                    a.name = repl.clone();
                }
            }
            for s in &mut parts.stops.records {
                if s.name.is_empty() && s.location_type.value() <= 2 {
                    s.name = repl.clone();
                }
            }
        }

        let mut feed = Feed::new();

        for (agency, extras) in parts.agencies.records.into_iter().zip(parts.agencies.extras) {
            let id = agency.id.clone().unwrap_or_default();
            record_extras(&mut feed.extra.agencies, &id, extras);
            feed.agencies.insert(id, agency);
        }

        if let Some(levels) = parts.levels {
            for (level, extras) in levels.records.into_iter().zip(levels.extras) {
                record_extras(&mut feed.extra.levels, &level.id, extras);
                feed.levels.insert(level.id.clone(), level);
            }
        }

        for (stop, extras) in parts.stops.records.into_iter().zip(parts.stops.extras) {
            if self.check_null_coordinates
                && stop.latitude == Some(0.0)
                && stop.longitude == Some(0.0)
            {
                if self.drop_erroneous {
                    log::warn!("dropping stop '{}' with null coordinates", stop.id);
                    continue;
                }
                return Err(Error::NullCoordinates(stop.id));
            }
            record_extras(&mut feed.extra.stops, &stop.id, extras);
            feed.stops.insert(stop.id.clone(), stop);
        }
        // dangling parent and level references are cleared instead of
        // cascading; a stop remains useful without its parent
        let stop_ids: std::collections::HashSet<String> = feed.stops.keys().cloned().collect();
        for stop in feed.stops.values_mut() {
            if let Some(p) = &stop.parent_station {
                if !stop_ids.contains(p) {
                    if !self.drop_erroneous {
                        return Err(Error::ReferenceError(p.clone()));
                    }
                    stop.parent_station = None;
                }
            }
            if let Some(l) = &stop.level_id {
                if !feed.levels.contains_key(l) {
                    if !self.drop_erroneous {
                        return Err(Error::ReferenceError(l.clone()));
                    }
                    stop.level_id = None;
                }
            }
        }

        for (route, extras) in parts.routes.records.into_iter().zip(parts.routes.extras) {
            if let Some(a) = &route.agency_id {
                if !feed.agencies.contains_key(a) {
                    if !self.drop_erroneous {
                        return Err(Error::ReferenceError(a.clone()));
                    }
                    log::warn!("dropping route '{}' referencing unknown agency", route.id);
                    continue;
                }
            }
            record_extras(&mut feed.extra.routes, &route.id, extras);
            feed.routes.insert(route.id.clone(), route);
        }

        if let Some(calendar) = parts.calendar {
            for cal in calendar.records {
                feed.services
                    .insert(cal.id.clone(), Service::from_calendar(&cal));
            }
        }
        if let Some(dates) = parts.calendar_dates {
            for cd in dates.records {
                let service = feed
                    .services
                    .entry(cd.service_id.clone())
                    .or_insert_with(|| Service::new(cd.service_id.clone()));
                service
                    .exceptions
                    .insert(cd.date, cd.exception_type == Exception::Added);
            }
        }

        for (raw, extras) in parts.trips.records.into_iter().zip(parts.trips.extras) {
            let trip = Trip::from_raw(raw);
            if !feed.routes.contains_key(&trip.route_id) {
                if !self.drop_erroneous {
                    return Err(Error::ReferenceError(trip.route_id));
                }
                log::warn!("dropping trip '{}' referencing unknown route", trip.id);
                continue;
            }
            if !feed.services.contains_key(&trip.service_id) {
                if !self.drop_erroneous {
                    return Err(Error::ReferenceError(trip.service_id));
                }
                log::warn!("dropping trip '{}' referencing unknown service", trip.id);
                continue;
            }
            record_extras(&mut feed.extra.trips, &trip.id, extras);
            feed.trips.insert(trip.id.clone(), trip);
        }

        if let Some(shapes) = parts.shapes {
            for (pt, extras) in shapes.records.into_iter().zip(shapes.extras) {
                record_extras(&mut feed.extra.shapes, &pt.shape_id, extras);
                let shape = feed
                    .shapes
                    .entry(pt.shape_id.clone())
                    .or_insert_with(|| Shape {
                        id: pt.shape_id.clone(),
                        points: Vec::new(),
                    });
                shape.points.push(ShapePoint {
                    lat: pt.latitude,
                    lon: pt.longitude,
                    sequence: pt.sequence,
                    dist_traveled: pt.dist_traveled,
                });
            }
            for shape in feed.shapes.values_mut() {
                shape.points.sort_by_key(|p| p.sequence);
            }
        }
        for trip in feed.trips.values_mut() {
            if let Some(s) = &trip.shape_id {
                if !feed.shapes.contains_key(s) {
                    if !self.drop_erroneous {
                        return Err(Error::ReferenceError(s.clone()));
                    }
                    trip.shape_id = None;
                }
            }
        }

        // a stop time referencing a dropped stop cascades into dropping the
        // whole trip, the remaining times would fake a shorter run
        let mut doomed_trips = std::collections::HashSet::new();
        for st in &parts.stop_times.records {
            if feed.trips.contains_key(&st.trip_id) && !feed.stops.contains_key(&st.stop_id) {
                if !self.drop_erroneous {
                    return Err(Error::ReferenceError(st.stop_id.clone()));
                }
                log::warn!(
                    "dropping trip '{}': stop time references unknown stop '{}'",
                    st.trip_id,
                    st.stop_id
                );
                doomed_trips.insert(st.trip_id.clone());
            }
        }
        for id in &doomed_trips {
            feed.trips.remove(id);
        }
        for (raw, extras) in parts
            .stop_times
            .records
            .into_iter()
            .zip(parts.stop_times.extras)
        {
            let Some(trip) = feed.trips.get_mut(&raw.trip_id) else {
                if doomed_trips.contains(&raw.trip_id) || self.drop_erroneous {
                    continue;
                }
                return Err(Error::ReferenceError(raw.trip_id));
            };
            for (col, val) in extras {
                feed.extra
                    .stop_times
                    .entry(col)
                    .or_default()
                    .insert((raw.trip_id.clone(), raw.stop_sequence), val);
            }
            trip.stop_times.push(StopTime::from_raw(&raw));
        }
        for trip in feed.trips.values_mut() {
            trip.stop_times.sort_by_key(|st| st.sequence);
        }

        if let Some(frequencies) = parts.frequencies {
            for f in frequencies.records {
                let Some(trip) = feed.trips.get_mut(&f.trip_id) else {
                    if self.drop_erroneous {
                        continue;
                    }
                    return Err(Error::ReferenceError(f.trip_id));
                };
                trip.frequencies.push(Frequency::from_raw(&f));
            }
        }

        if let Some(fares) = parts.fare_attributes {
            for (raw, extras) in fares.records.into_iter().zip(fares.extras) {
                let fare = FareAttribute::from_raw(raw);
                if let Some(a) = &fare.agency_id {
                    if !feed.agencies.contains_key(a) {
                        if !self.drop_erroneous {
                            return Err(Error::ReferenceError(a.clone()));
                        }
                        log::warn!("dropping fare '{}' referencing unknown agency", fare.id);
                        continue;
                    }
                }
                record_extras(&mut feed.extra.fare_attributes, &fare.id, extras);
                feed.fare_attributes.insert(fare.id.clone(), fare);
            }
        }
        if let Some(rules) = parts.fare_rules {
            for rule in rules.records {
                if let Some(r) = &rule.route_id {
                    if !feed.routes.contains_key(r) {
                        if !self.drop_erroneous {
                            return Err(Error::ReferenceError(r.clone()));
                        }
                        continue;
                    }
                }
                let Some(fare) = feed.fare_attributes.get_mut(&rule.fare_id) else {
                    if self.drop_erroneous {
                        continue;
                    }
                    return Err(Error::ReferenceError(rule.fare_id));
                };
                fare.rules.push(rule);
            }
        }

        if let Some(transfers) = parts.transfers {
            for t in transfers.records {
                let endpoints_ok = feed.stops.contains_key(&t.from_stop_id)
                    && feed.stops.contains_key(&t.to_stop_id)
                    && [&t.from_route_id, &t.to_route_id]
                        .iter()
                        .all(|r| r.as_ref().map_or(true, |r| feed.routes.contains_key(r)))
                    && [&t.from_trip_id, &t.to_trip_id]
                        .iter()
                        .all(|tr| tr.as_ref().map_or(true, |tr| feed.trips.contains_key(tr)));
                if !endpoints_ok {
                    if self.drop_erroneous {
                        continue;
                    }
                    return Err(Error::ReferenceError(format!(
                        "transfer {} -> {}",
                        t.from_stop_id, t.to_stop_id
                    )));
                }
                feed.transfers.insert(
                    TransferKey {
                        from_stop_id: t.from_stop_id,
                        to_stop_id: t.to_stop_id,
                        from_route_id: t.from_route_id,
                        to_route_id: t.to_route_id,
                        from_trip_id: t.from_trip_id,
                        to_trip_id: t.to_trip_id,
                    },
                    Transfer {
                        transfer_type: t.transfer_type,
                        min_transfer_time: t.min_transfer_time,
                    },
                );
            }
        }

        if let Some(pathways) = parts.pathways {
            for (pathway, extras) in pathways.records.into_iter().zip(pathways.extras) {
                if !feed.stops.contains_key(&pathway.from_stop_id)
                    || !feed.stops.contains_key(&pathway.to_stop_id)
                {
                    if self.drop_erroneous {
                        continue;
                    }
                    return Err(Error::ReferenceError(pathway.id));
                }
                record_extras(&mut feed.extra.pathways, &pathway.id, extras);
                feed.pathways.insert(pathway.id.clone(), pathway);
            }
        }

        if let Some(attributions) = parts.attributions {
            for attr in attributions.records {
                if let Some(trip_id) = attr.trip_id.clone() {
                    match feed.trips.get_mut(&trip_id) {
                        Some(trip) => trip.attributions.push(attr),
                        None if self.drop_erroneous => continue,
                        None => return Err(Error::ReferenceError(trip_id)),
                    }
                } else if let Some(route_id) = attr.route_id.clone() {
                    match feed.routes.get_mut(&route_id) {
                        Some(route) => route.attributions.push(attr),
                        None if self.drop_erroneous => continue,
                        None => return Err(Error::ReferenceError(route_id)),
                    }
                } else if let Some(agency_id) = attr.agency_id.clone() {
                    match feed.agencies.get_mut(&agency_id) {
                        Some(agency) => agency.attributions.push(attr),
                        None if self.drop_erroneous => continue,
                        None => return Err(Error::ReferenceError(agency_id)),
                    }
                } else {
                    feed.attributions.push(attr);
                }
            }
        }

        Ok(feed)
    }
}

fn record_extras(table: &mut ExtraTable, id: &str, extras: Vec<(String, String)>) {
    for (col, val) in extras {
        table.entry(col).or_default().insert(id.to_string(), val);
    }
}

/// Replaces `Unknown` enumeration values by the field defaults
fn unknown_to_default(parts: &mut RawParts) {
    for stop in &mut parts.stops.records {
        if let LocationType::Unknown(_) = stop.location_type {
            stop.location_type = LocationType::default();
        }
        if let Availability::Unknown(_) = stop.wheelchair_boarding {
            stop.wheelchair_boarding = Availability::default();
        }
    }
    for st in &mut parts.stop_times.records {
        if let PickupDropOffType::Unknown(_) = st.pickup_type {
            st.pickup_type = PickupDropOffType::default();
        }
        if let PickupDropOffType::Unknown(_) = st.drop_off_type {
            st.drop_off_type = PickupDropOffType::default();
        }
        if let ContinuousPickupDropOff::Unknown(_) = st.continuous_pickup {
            st.continuous_pickup = ContinuousPickupDropOff::default();
        }
        if let ContinuousPickupDropOff::Unknown(_) = st.continuous_drop_off {
            st.continuous_drop_off = ContinuousPickupDropOff::default();
        }
    }
    for trip in &mut parts.trips.records {
        if let Availability::Unknown(_) = trip.wheelchair_accessible {
            trip.wheelchair_accessible = Availability::default();
        }
        if let BikesAllowed::Unknown(_) = trip.bikes_allowed {
            trip.bikes_allowed = BikesAllowed::default();
        }
    }
    for route in &mut parts.routes.records {
        if let ContinuousPickupDropOff::Unknown(_) = route.continuous_pickup {
            route.continuous_pickup = ContinuousPickupDropOff::default();
        }
        if let ContinuousPickupDropOff::Unknown(_) = route.continuous_drop_off {
            route.continuous_drop_off = ContinuousPickupDropOff::default();
        }
    }
}
