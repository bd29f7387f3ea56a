use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

use crate::error::Error;
use crate::objects::*;

/// One scheduled arrival/departure of a trip at a stop, owned by its trip
#[derive(Debug, Default, Clone)]
pub struct StopTime {
    /// The stop the vehicle halts at
    pub stop_id: String,
    /// Arrival time in seconds since midnight; may exceed 24h
    pub arrival_time: Option<u32>,
    /// Departure time in seconds since midnight; may exceed 24h
    pub departure_time: Option<u32>,
    /// Order of this halt within the trip
    pub sequence: u32,
    /// Overrides the trip headsign at this stop
    pub headsign: Option<String>,
    pub pickup_type: PickupDropOffType,
    pub drop_off_type: PickupDropOffType,
    pub continuous_pickup: ContinuousPickupDropOff,
    pub continuous_drop_off: ContinuousPickupDropOff,
    /// Distance traveled along the trip's shape up to this stop
    pub shape_dist_traveled: Option<f32>,
    pub timepoint: TimepointType,
}

impl StopTime {
    pub fn from_raw(raw: &RawStopTime) -> Self {
        StopTime {
            stop_id: raw.stop_id.clone(),
            arrival_time: raw.arrival_time,
            departure_time: raw.departure_time,
            sequence: raw.stop_sequence,
            headsign: raw.stop_headsign.clone(),
            pickup_type: raw.pickup_type,
            drop_off_type: raw.drop_off_type,
            continuous_pickup: raw.continuous_pickup,
            continuous_drop_off: raw.continuous_drop_off,
            shape_dist_traveled: raw.shape_dist_traveled,
            timepoint: raw.timepoint,
        }
    }
}

/// A repetition window during which a trip template repeats every
/// `headway_secs` seconds
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Frequency {
    pub start_time: u32,
    pub end_time: u32,
    pub headway_secs: u32,
    pub exact_times: bool,
}

impl Frequency {
    pub fn from_raw(raw: &RawFrequency) -> Self {
        Frequency {
            start_time: raw.start_time,
            end_time: raw.end_time,
            headway_secs: raw.headway_secs,
            exact_times: raw.exact_times.unwrap_or(false),
        }
    }
}

/// A single vehicle run with its ordered halts
#[derive(Debug, Default, Clone)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub service_id: String,
    pub headsign: Option<String>,
    pub short_name: Option<String>,
    pub direction_id: Option<DirectionType>,
    pub block_id: Option<String>,
    pub shape_id: Option<String>,
    pub wheelchair_accessible: Availability,
    pub bikes_allowed: BikesAllowed,
    /// Ordered by `sequence`
    pub stop_times: Vec<StopTime>,
    pub frequencies: Vec<Frequency>,
    /// Attributions owned by this trip
    pub attributions: Vec<Attribution>,
}

impl Trip {
    pub fn from_raw(raw: RawTrip) -> Self {
        Trip {
            id: raw.id,
            route_id: raw.route_id,
            service_id: raw.service_id,
            headsign: raw.trip_headsign,
            short_name: raw.trip_short_name,
            direction_id: raw.direction_id,
            block_id: raw.block_id,
            shape_id: raw.shape_id,
            wheelchair_accessible: raw.wheelchair_accessible,
            bikes_allowed: raw.bikes_allowed,
            stop_times: Vec::new(),
            frequencies: Vec::new(),
            attributions: Vec::new(),
        }
    }
}

/// One point of a shape polyline
#[derive(Debug, Default, Clone, Copy)]
pub struct ShapePoint {
    pub lat: f64,
    pub lon: f64,
    pub sequence: u32,
    pub dist_traveled: Option<f32>,
}

/// An ordered polyline associated with trips
#[derive(Debug, Default, Clone)]
pub struct Shape {
    pub id: String,
    /// Ordered by `sequence`
    pub points: Vec<ShapePoint>,
}

impl Shape {
    /// The measurement of the last point, if the shape is measured
    pub fn last_measure(&self) -> Option<f32> {
        self.points.last().and_then(|p| p.dist_traveled)
    }
}

/// A recurrence pattern over calendar dates: a weekday bitmap over a date
/// range, modified by per-date exceptions. The unified form of one
/// `calendar.txt` row and its `calendar_dates.txt` rows
#[derive(Debug, Default, Clone)]
pub struct Service {
    pub id: String,
    /// Bit `i` = active on weekday `i`, Monday = 0 .. Sunday = 6
    pub weekdays: u8,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Date overrides: `true` adds the date, `false` removes it
    pub exceptions: BTreeMap<NaiveDate, bool>,
}

impl Service {
    pub fn new(id: String) -> Self {
        Service {
            id,
            ..Default::default()
        }
    }

    pub fn from_calendar(cal: &Calendar) -> Self {
        let days = [
            cal.monday,
            cal.tuesday,
            cal.wednesday,
            cal.thursday,
            cal.friday,
            cal.saturday,
            cal.sunday,
        ];
        let mut weekdays = 0u8;
        for (i, on) in days.iter().enumerate() {
            if *on {
                weekdays |= 1 << i;
            }
        }
        Service {
            id: cal.id.clone(),
            weekdays,
            start_date: Some(cal.start_date),
            end_date: Some(cal.end_date),
            exceptions: BTreeMap::new(),
        }
    }

    /// True if weekday `i` (Monday = 0) is set in the bitmap
    pub fn weekday(&self, i: u8) -> bool {
        self.weekdays & (1 << i) != 0
    }

    pub fn set_weekday(&mut self, i: u8, active: bool) {
        if active {
            self.weekdays |= 1 << i;
        } else {
            self.weekdays &= !(1 << i);
        }
    }

    /// Whether a vehicle on this service runs on the given date.
    /// An exception entry overrides the calendar range
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if let Some(&added) = self.exceptions.get(&date) {
            return added;
        }
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => {
                date >= start
                    && date <= end
                    && self.weekday(date.weekday().num_days_from_monday() as u8)
            }
            _ => false,
        }
    }

    /// Earliest date mentioned by the calendar range or an exception
    pub fn first_defined_date(&self) -> Option<NaiveDate> {
        let first_exc = self.exceptions.keys().next().copied();
        match (self.start_date, first_exc) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Latest date mentioned by the calendar range or an exception
    pub fn last_defined_date(&self) -> Option<NaiveDate> {
        let last_exc = self.exceptions.keys().next_back().copied();
        match (self.end_date, last_exc) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Earliest date the service is actually active on
    pub fn first_active_date(&self) -> Option<NaiveDate> {
        let (mut first, last) = (self.first_defined_date()?, self.last_defined_date()?);
        while first <= last {
            if self.is_active_on(first) {
                return Some(first);
            }
            first += Duration::days(1);
        }
        None
    }

    /// Latest date the service is actually active on
    pub fn last_active_date(&self) -> Option<NaiveDate> {
        let (first, mut last) = (self.first_defined_date()?, self.last_defined_date()?);
        while last >= first {
            if self.is_active_on(last) {
                return Some(last);
            }
            last -= Duration::days(1);
        }
        None
    }

    /// All active dates, in order
    pub fn active_dates(&self) -> Vec<NaiveDate> {
        let mut ret = Vec::new();
        let (Some(first), Some(last)) = (self.first_active_date(), self.last_active_date()) else {
            return ret;
        };
        let mut d = first;
        while d <= last {
            if self.is_active_on(d) {
                ret.push(d);
            }
            d += Duration::days(1);
        }
        ret
    }
}

/// A fare with its restricting rules attached
#[derive(Debug, Clone)]
pub struct FareAttribute {
    pub id: String,
    pub price: String,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub transfers: FareTransfers,
    pub agency_id: Option<String>,
    pub transfer_duration: Option<u32>,
    pub rules: Vec<FareRule>,
}

impl FareAttribute {
    pub fn from_raw(raw: RawFareAttribute) -> Self {
        FareAttribute {
            id: raw.id,
            price: raw.price,
            currency: raw.currency,
            payment_method: raw.payment_method,
            transfers: raw.transfers,
            agency_id: raw.agency_id,
            transfer_duration: raw.transfer_duration,
            rules: Vec::new(),
        }
    }
}

/// The full endpoint tuple identifying a transfer rule
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferKey {
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub from_route_id: Option<String>,
    pub to_route_id: Option<String>,
    pub from_trip_id: Option<String>,
    pub to_trip_id: Option<String>,
}

/// The payload of a transfer rule
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub transfer_type: TransferType,
    pub min_transfer_time: Option<u32>,
}

/// Additional, non-standard columns of one table: column name → entity id → value
pub type ExtraTable = HashMap<String, HashMap<String, String>>;

/// Non-standard columns carried through verbatim, per table
#[derive(Debug, Default, Clone)]
pub struct ExtraFields {
    pub agencies: ExtraTable,
    pub stops: ExtraTable,
    pub routes: ExtraTable,
    pub trips: ExtraTable,
    /// Keyed by column name, then (trip id, stop sequence)
    pub stop_times: HashMap<String, HashMap<(String, u32), String>>,
    pub shapes: ExtraTable,
    pub fare_attributes: ExtraTable,
    pub pathways: ExtraTable,
    pub levels: ExtraTable,
}

/// True if the two ids carry the same additional-column values in `table`
pub fn extra_fields_equal(table: &ExtraTable, a: &str, b: &str) -> bool {
    table.values().all(|col| col.get(a) == col.get(b))
}

/// Moves all additional-column values of `old` to `new`
pub fn rekey_extra_fields(table: &mut ExtraTable, old: &str, new: &str) {
    for col in table.values_mut() {
        if let Some(v) = col.remove(old) {
            col.insert(new.to_string(), v);
        }
    }
}

/// The complete in-memory model of one schedule dataset.
///
/// Every table exclusively owns its entities by id; relationships between
/// entities are string-id references into the owning table. Processors may
/// mutate the tables freely but must leave every reference pointing at an
/// existing entity.
#[derive(Debug, Default)]
pub struct Feed {
    pub agencies: HashMap<String, Agency>,
    pub stops: HashMap<String, Stop>,
    pub routes: HashMap<String, Route>,
    pub services: HashMap<String, Service>,
    pub trips: HashMap<String, Trip>,
    pub shapes: HashMap<String, Shape>,
    pub levels: HashMap<String, Level>,
    pub fare_attributes: HashMap<String, FareAttribute>,
    pub transfers: HashMap<TransferKey, Transfer>,
    pub pathways: HashMap<String, Pathway>,
    /// Attributions that apply to the whole dataset (route/trip-scoped ones
    /// are owned by their route or trip)
    pub attributions: Vec<Attribution>,
    pub extra: ExtraFields,
}

impl Feed {
    pub fn new() -> Feed {
        Feed::default()
    }

    /// The station-level stop a stop belongs to, for grouping halts by
    /// logical station: stations map to themselves, platform-like stops to
    /// their station parent, boarding areas through their platform to the
    /// station grandparent
    pub fn station_of<'a>(&'a self, stop_id: &'a str) -> &'a str {
        let Some(stop) = self.stops.get(stop_id) else {
            return stop_id;
        };
        match stop.location_type {
            LocationType::Station => stop_id,
            LocationType::BoardingArea => match stop.parent_station.as_deref() {
                Some(parent_id) => match self.stops.get(parent_id) {
                    Some(parent) => parent.parent_station.as_deref().unwrap_or(parent_id),
                    None => parent_id,
                },
                None => stop_id,
            },
            _ => stop.parent_station.as_deref().unwrap_or(stop_id),
        }
    }

    /// Drops every transfer with a vanished stop, route or trip endpoint
    pub fn clean_transfers(&mut self) {
        let (stops, routes, trips) = (&self.stops, &self.routes, &self.trips);
        self.transfers.retain(|k, _| {
            stops.contains_key(&k.from_stop_id)
                && stops.contains_key(&k.to_stop_id)
                && k.from_route_id
                    .as_ref()
                    .map_or(true, |r| routes.contains_key(r))
                && k.to_route_id
                    .as_ref()
                    .map_or(true, |r| routes.contains_key(r))
                && k.from_trip_id
                    .as_ref()
                    .map_or(true, |t| trips.contains_key(t))
                && k.to_trip_id
                    .as_ref()
                    .map_or(true, |t| trips.contains_key(t))
        });
    }

    /// Verifies that every reference from a surviving record points at a
    /// surviving record
    pub fn check_references(&self) -> Result<(), Error> {
        let missing = |id: &str| Err(Error::ReferenceError(id.to_string()));

        for stop in self.stops.values() {
            if let Some(p) = &stop.parent_station {
                if !self.stops.contains_key(p) {
                    return missing(p);
                }
            }
            if let Some(l) = &stop.level_id {
                if !self.levels.contains_key(l) {
                    return missing(l);
                }
            }
        }
        for route in self.routes.values() {
            if let Some(a) = &route.agency_id {
                if !self.agencies.contains_key(a) {
                    return missing(a);
                }
            }
        }
        for trip in self.trips.values() {
            if !self.routes.contains_key(&trip.route_id) {
                return missing(&trip.route_id);
            }
            if !self.services.contains_key(&trip.service_id) {
                return missing(&trip.service_id);
            }
            if let Some(s) = &trip.shape_id {
                if !self.shapes.contains_key(s) {
                    return missing(s);
                }
            }
            for st in &trip.stop_times {
                if !self.stops.contains_key(&st.stop_id) {
                    return missing(&st.stop_id);
                }
            }
        }
        for fare in self.fare_attributes.values() {
            if let Some(a) = &fare.agency_id {
                if !self.agencies.contains_key(a) {
                    return missing(a);
                }
            }
            for rule in &fare.rules {
                if let Some(r) = &rule.route_id {
                    if !self.routes.contains_key(r) {
                        return missing(r);
                    }
                }
            }
        }
        for key in self.transfers.keys() {
            if !self.stops.contains_key(&key.from_stop_id) {
                return missing(&key.from_stop_id);
            }
            if !self.stops.contains_key(&key.to_stop_id) {
                return missing(&key.to_stop_id);
            }
            for route_id in [&key.from_route_id, &key.to_route_id].into_iter().flatten() {
                if !self.routes.contains_key(route_id) {
                    return missing(route_id);
                }
            }
            for trip_id in [&key.from_trip_id, &key.to_trip_id].into_iter().flatten() {
                if !self.trips.contains_key(trip_id) {
                    return missing(trip_id);
                }
            }
        }
        for pathway in self.pathways.values() {
            if !self.stops.contains_key(&pathway.from_stop_id) {
                return missing(&pathway.from_stop_id);
            }
            if !self.stops.contains_key(&pathway.to_stop_id) {
                return missing(&pathway.to_stop_id);
            }
        }
        let all_attributions = self
            .attributions
            .iter()
            .chain(self.agencies.values().flat_map(|a| &a.attributions))
            .chain(self.routes.values().flat_map(|r| &r.attributions))
            .chain(self.trips.values().flat_map(|t| &t.attributions));
        for attr in all_attributions {
            if let Some(a) = &attr.agency_id {
                if !self.agencies.contains_key(a) {
                    return missing(a);
                }
            }
            if let Some(r) = &attr.route_id {
                if !self.routes.contains_key(r) {
                    return missing(r);
                }
            }
            if let Some(t) = &attr.trip_id {
                if !self.trips.contains_key(t) {
                    return missing(t);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn service_activity_honors_range_bitmap_and_exceptions() {
        let mut s = Service::new("wk".to_string());
        s.weekdays = 0b0011111; // Mon-Fri
        s.start_date = Some(date(2017, 1, 2));
        s.end_date = Some(date(2017, 1, 29));

        assert!(s.is_active_on(date(2017, 1, 2))); // a Monday
        assert!(!s.is_active_on(date(2017, 1, 7))); // a Saturday
        assert!(!s.is_active_on(date(2017, 2, 6))); // outside the range

        s.exceptions.insert(date(2017, 1, 3), false);
        s.exceptions.insert(date(2017, 1, 7), true);
        assert!(!s.is_active_on(date(2017, 1, 3)));
        assert!(s.is_active_on(date(2017, 1, 7)));
    }

    #[test]
    fn service_active_date_bounds() {
        let mut s = Service::new("a".to_string());
        s.weekdays = 0b1111111;
        s.start_date = Some(date(2017, 1, 2));
        s.end_date = Some(date(2017, 1, 8));
        s.exceptions.insert(date(2017, 1, 2), false);
        s.exceptions.insert(date(2017, 1, 20), true);

        assert_eq!(s.first_active_date(), Some(date(2017, 1, 3)));
        assert_eq!(s.last_active_date(), Some(date(2017, 1, 20)));
        assert_eq!(s.active_dates().len(), 7);
    }

    #[test]
    fn reference_check_covers_attribution_and_transfer_owners() {
        let mut feed = Feed::new();
        feed.stops.insert(
            "S".into(),
            Stop {
                id: "S".into(),
                ..Default::default()
            },
        );
        feed.routes.insert(
            "R".into(),
            Route {
                id: "R".into(),
                route_type: 3,
                ..Default::default()
            },
        );
        feed.services.insert("SV".into(), Service::new("SV".to_string()));
        feed.trips.insert(
            "T".into(),
            Trip {
                id: "T".into(),
                route_id: "R".into(),
                service_id: "SV".into(),
                ..Default::default()
            },
        );
        feed.check_references().unwrap();

        // an attribution pointing at a vanished trip fails the closure
        feed.trips.get_mut("T").unwrap().attributions.push(Attribution {
            trip_id: Some("GONE".into()),
            organization_name: "Operator".into(),
            ..Default::default()
        });
        assert!(feed.check_references().is_err());
        feed.trips.get_mut("T").unwrap().attributions[0].trip_id = Some("T".into());
        feed.check_references().unwrap();

        // a transfer keyed on a vanished route fails it too
        feed.transfers.insert(
            TransferKey {
                from_stop_id: "S".into(),
                to_stop_id: "S".into(),
                from_route_id: Some("GONE".into()),
                ..Default::default()
            },
            Transfer::default(),
        );
        assert!(feed.check_references().is_err());
    }

    #[test]
    fn station_resolution_walks_the_parent_forest() {
        let mut feed = Feed::new();
        feed.stops.insert(
            "S".into(),
            Stop {
                id: "S".into(),
                location_type: LocationType::Station,
                ..Default::default()
            },
        );
        feed.stops.insert(
            "P".into(),
            Stop {
                id: "P".into(),
                parent_station: Some("S".into()),
                ..Default::default()
            },
        );
        feed.stops.insert(
            "B".into(),
            Stop {
                id: "B".into(),
                location_type: LocationType::BoardingArea,
                parent_station: Some("P".into()),
                ..Default::default()
            },
        );
        feed.stops.insert(
            "L".into(),
            Stop {
                id: "L".into(),
                ..Default::default()
            },
        );

        assert_eq!(feed.station_of("S"), "S");
        assert_eq!(feed.station_of("P"), "S");
        assert_eq!(feed.station_of("B"), "S");
        assert_eq!(feed.station_of("L"), "L");
    }
}
