pub use crate::enums::*;
use crate::serde_helpers::*;
use chrono::NaiveDate;
use rgb::RGB8;

use std::fmt;

/// Objects that have an identifier implement this trait
///
/// Those identifiers are technical and should not be shown to travellers
pub trait Id {
    /// Identifier of the object
    fn id(&self) -> &str;
}

/// General information about an agency running the network.
/// Maps one row of `agency.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Agency {
    /// Unique technical identifier of the agency. Optional when the feed
    /// has a single agency
    #[serde(rename = "agency_id")]
    pub id: Option<String>,
    /// Full name of the transit agency
    #[serde(rename = "agency_name")]
    pub name: String,
    /// URL of the transit agency
    #[serde(rename = "agency_url")]
    pub url: String,
    /// Timezone where the transit agency is located
    #[serde(rename = "agency_timezone")]
    pub timezone: String,
    /// Primary language used by this transit agency
    #[serde(rename = "agency_lang")]
    pub lang: Option<String>,
    /// A voice telephone number for the specified agency
    #[serde(rename = "agency_phone")]
    pub phone: Option<String>,
    /// URL of a web page where a rider can purchase tickets online
    #[serde(rename = "agency_fare_url")]
    pub fare_url: Option<String>,
    /// Email address actively monitored by the agency's customer service
    #[serde(rename = "agency_email")]
    pub email: Option<String>,
    /// Attributions owned by this agency
    #[serde(skip)]
    pub attributions: Vec<Attribution>,
}

impl Agency {
    pub const FIELDS: &'static [&'static str] = &[
        "agency_id",
        "agency_name",
        "agency_url",
        "agency_timezone",
        "agency_lang",
        "agency_phone",
        "agency_fare_url",
        "agency_email",
    ];
}

impl Id for Agency {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A physical stop, station, entrance or generic node.
/// Maps one row of `stops.txt`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Stop {
    /// Unique technical identifier of the stop
    #[serde(rename = "stop_id")]
    pub id: String,
    /// Short text or number that identifies the location for riders
    #[serde(rename = "stop_code")]
    pub code: Option<String>,
    /// Name of the location
    #[serde(default, rename = "stop_name")]
    pub name: String,
    /// Description of the location
    #[serde(default, rename = "stop_desc")]
    pub description: String,
    /// Latitude of the stop
    #[serde(default, rename = "stop_lat", deserialize_with = "de_with_optional_float")]
    pub latitude: Option<f64>,
    /// Longitude of the stop
    #[serde(default, rename = "stop_lon", deserialize_with = "de_with_optional_float")]
    pub longitude: Option<f64>,
    /// Identifies the fare zone for a stop
    pub zone_id: Option<String>,
    /// URL of a web page about the location
    #[serde(rename = "stop_url")]
    pub url: Option<String>,
    /// Type of the location
    #[serde(default)]
    pub location_type: LocationType,
    /// Defines hierarchy between the different locations
    pub parent_station: Option<String>,
    /// Timezone of the location
    #[serde(rename = "stop_timezone")]
    pub timezone: Option<String>,
    /// Indicates whether wheelchair boardings are possible from the location
    #[serde(default, deserialize_with = "de_with_empty_default")]
    pub wheelchair_boarding: Availability,
    /// Level of the location
    pub level_id: Option<String>,
    /// Platform identifier for a platform stop belonging to a station
    pub platform_code: Option<String>,
}

impl Stop {
    pub const FIELDS: &'static [&'static str] = &[
        "stop_id",
        "stop_code",
        "stop_name",
        "stop_desc",
        "stop_lat",
        "stop_lon",
        "zone_id",
        "stop_url",
        "location_type",
        "parent_station",
        "stop_timezone",
        "wheelchair_boarding",
        "level_id",
        "platform_code",
    ];
}

impl Id for Stop {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A commercial line. Maps one row of `routes.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Route {
    /// Unique technical identifier of the route
    #[serde(rename = "route_id")]
    pub id: String,
    /// Agency for the specified route
    pub agency_id: Option<String>,
    /// Short name of the route, e.g. "32" or "Green"
    #[serde(default, rename = "route_short_name")]
    pub short_name: String,
    /// Full name of the route, generally more descriptive than the short name
    #[serde(default, rename = "route_long_name")]
    pub long_name: String,
    /// Description of the route
    #[serde(default, rename = "route_desc")]
    pub desc: String,
    /// Type of transportation used on the route, including extended codes
    pub route_type: i16,
    /// URL of a web page about the particular route
    #[serde(rename = "route_url")]
    pub url: Option<String>,
    /// Route color designation that matches public facing material
    #[serde(
        default = "default_route_color",
        rename = "route_color",
        deserialize_with = "deserialize_route_color"
    )]
    pub color: RGB8,
    /// Legible color for text drawn against a background of the route color
    #[serde(
        default,
        rename = "route_text_color",
        deserialize_with = "deserialize_route_text_color"
    )]
    pub text_color: RGB8,
    /// Orders the routes for presentation to customers
    #[serde(rename = "route_sort_order")]
    pub sort_order: Option<u32>,
    /// Whether a rider can board anywhere along the vehicle's travel path
    #[serde(default)]
    pub continuous_pickup: ContinuousPickupDropOff,
    /// Whether a rider can alight anywhere along the vehicle's travel path
    #[serde(default)]
    pub continuous_drop_off: ContinuousPickupDropOff,
    /// Attributions owned by this route
    #[serde(skip)]
    pub attributions: Vec<Attribution>,
}

impl Route {
    pub const FIELDS: &'static [&'static str] = &[
        "route_id",
        "agency_id",
        "route_short_name",
        "route_long_name",
        "route_desc",
        "route_type",
        "route_url",
        "route_color",
        "route_text_color",
        "route_sort_order",
        "continuous_pickup",
        "continuous_drop_off",
    ];
}

impl Id for Route {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.long_name.is_empty() {
            write!(f, "{}", self.long_name)
        } else {
            write!(f, "{}", self.short_name)
        }
    }
}

/// A trip as read from `trips.txt`, before its stop times and frequencies
/// are attached
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawTrip {
    /// Unique technical identifier of the trip
    #[serde(rename = "trip_id")]
    pub id: String,
    /// References along which route this trip runs
    pub route_id: String,
    /// References the service on which this trip runs
    pub service_id: String,
    /// Text that appears on signage identifying the trip's destination
    pub trip_headsign: Option<String>,
    /// Public facing text used to identify the trip to riders
    pub trip_short_name: Option<String>,
    /// Direction of travel, used to separate trips by direction
    pub direction_id: Option<DirectionType>,
    /// Block of sequential trips made with the same vehicle
    pub block_id: Option<String>,
    /// Shape of the trip
    pub shape_id: Option<String>,
    /// Indicates wheelchair accessibility
    #[serde(default)]
    pub wheelchair_accessible: Availability,
    /// Indicates whether bikes are allowed
    #[serde(default)]
    pub bikes_allowed: BikesAllowed,
}

impl RawTrip {
    pub const FIELDS: &'static [&'static str] = &[
        "trip_id",
        "route_id",
        "service_id",
        "trip_headsign",
        "trip_short_name",
        "direction_id",
        "block_id",
        "shape_id",
        "wheelchair_accessible",
        "bikes_allowed",
    ];
}

/// One scheduled arrival/departure as read from `stop_times.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawStopTime {
    /// Trip to which this stop time belongs
    pub trip_id: String,
    /// Arrival time, in seconds since midnight; may exceed 24h for trips
    /// running past the end of the service day
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub arrival_time: Option<u32>,
    /// Departure time, same encoding as the arrival time
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub departure_time: Option<u32>,
    /// Stop where the vehicle stops
    pub stop_id: String,
    /// Order of stops within the trip; increasing but not necessarily consecutive
    pub stop_sequence: u32,
    /// Overrides the trip headsign at this stop
    pub stop_headsign: Option<String>,
    #[serde(default)]
    pub pickup_type: PickupDropOffType,
    #[serde(default)]
    pub drop_off_type: PickupDropOffType,
    #[serde(default)]
    pub continuous_pickup: ContinuousPickupDropOff,
    #[serde(default)]
    pub continuous_drop_off: ContinuousPickupDropOff,
    /// Distance traveled along the associated shape up to this stop
    #[serde(default, deserialize_with = "de_with_optional_f32")]
    pub shape_dist_traveled: Option<f32>,
    /// Whether times are strictly adhered to or approximate
    #[serde(default)]
    pub timepoint: TimepointType,
}

impl RawStopTime {
    pub const FIELDS: &'static [&'static str] = &[
        "trip_id",
        "arrival_time",
        "departure_time",
        "stop_id",
        "stop_sequence",
        "stop_headsign",
        "pickup_type",
        "drop_off_type",
        "continuous_pickup",
        "continuous_drop_off",
        "shape_dist_traveled",
        "timepoint",
    ];
}

/// A single geographical point of a shape polyline.
/// Maps one row of `shapes.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawShapePoint {
    /// Identifier of the shape this point belongs to
    pub shape_id: String,
    /// Latitude of the shape point
    #[serde(rename = "shape_pt_lat")]
    pub latitude: f64,
    /// Longitude of the shape point
    #[serde(rename = "shape_pt_lon")]
    pub longitude: f64,
    /// Sequence in which the points connect to form the shape
    #[serde(rename = "shape_pt_sequence")]
    pub sequence: u32,
    /// Distance traveled along the shape up to this point
    #[serde(default, deserialize_with = "de_with_optional_f32")]
    pub dist_traveled: Option<f32>,
}

impl RawShapePoint {
    pub const FIELDS: &'static [&'static str] = &[
        "shape_id",
        "shape_pt_lat",
        "shape_pt_lon",
        "shape_pt_sequence",
        "shape_dist_traveled",
    ];
}

/// A weekly recurrence pattern. Maps one row of `calendar.txt`
#[derive(Debug, Deserialize, Clone)]
pub struct Calendar {
    /// Unique technical identifier of the service
    #[serde(rename = "service_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_bool")]
    pub monday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub tuesday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub wednesday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub thursday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub friday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub saturday: bool,
    #[serde(deserialize_with = "deserialize_bool")]
    pub sunday: bool,
    /// First service day of the interval
    #[serde(deserialize_with = "deserialize_date")]
    pub start_date: NaiveDate,
    /// Last service day of the interval, included
    #[serde(deserialize_with = "deserialize_date")]
    pub end_date: NaiveDate,
}

/// A specific date added to or removed from a service.
/// Maps one row of `calendar_dates.txt`
#[derive(Debug, Deserialize, Clone)]
pub struct CalendarDate {
    /// Identifier of the service that is modified at this date
    pub service_id: String,
    /// Date where the service is added or removed
    #[serde(deserialize_with = "deserialize_date")]
    pub date: NaiveDate,
    /// Whether the service is added or removed
    pub exception_type: Exception,
}

/// A headway-based repetition window as read from `frequencies.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawFrequency {
    /// References the trip that uses this frequency
    pub trip_id: String,
    /// Time at which the first vehicle departs from the first stop
    #[serde(deserialize_with = "deserialize_time")]
    pub start_time: u32,
    /// Time at which service changes to a different headway or ceases
    #[serde(deserialize_with = "deserialize_time")]
    pub end_time: u32,
    /// Seconds between departures from the same stop within the window
    pub headway_secs: u32,
    /// Whether the departures are exactly scheduled
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub exact_times: Option<bool>,
}

/// A transfer rule between two stops as read from `transfers.txt`,
/// including the route/trip-level extensions
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawTransfer {
    /// Stop from which to leave
    pub from_stop_id: String,
    /// Stop to transfer to
    pub to_stop_id: String,
    pub from_route_id: Option<String>,
    pub to_route_id: Option<String>,
    pub from_trip_id: Option<String>,
    pub to_trip_id: Option<String>,
    /// Type of the transfer
    #[serde(default)]
    pub transfer_type: TransferType,
    /// Minimum time needed to make the transfer, in seconds
    pub min_transfer_time: Option<u32>,
}

/// A pathway between two locations inside a station.
/// Maps one row of `pathways.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Pathway {
    /// Uniquely identifies the pathway
    #[serde(rename = "pathway_id")]
    pub id: String,
    /// Location at which the pathway begins
    pub from_stop_id: String,
    /// Location at which the pathway ends
    pub to_stop_id: String,
    /// Type of pathway between the two locations
    #[serde(rename = "pathway_mode")]
    pub mode: PathwayMode,
    /// Whether the pathway can be used in both directions
    #[serde(default, deserialize_with = "de_with_empty_default")]
    pub is_bidirectional: u8,
    /// Horizontal length of the pathway in meters
    #[serde(default, deserialize_with = "de_with_optional_f32")]
    pub length: Option<f32>,
    /// Average time in seconds to walk through the pathway
    pub traversal_time: Option<u32>,
    /// Number of stairs of the pathway
    pub stair_count: Option<i32>,
    /// Maximum slope ratio of the pathway
    #[serde(default, deserialize_with = "de_with_optional_f32")]
    pub max_slope: Option<f32>,
    /// Minimum width of the pathway in meters
    #[serde(default, deserialize_with = "de_with_optional_f32")]
    pub min_width: Option<f32>,
    /// Text from physical signage visible to transit riders
    pub signposted_as: Option<String>,
    /// Same as `signposted_as`, but for the backward direction
    pub reversed_signposted_as: Option<String>,
}

impl Pathway {
    pub const FIELDS: &'static [&'static str] = &[
        "pathway_id",
        "from_stop_id",
        "to_stop_id",
        "pathway_mode",
        "is_bidirectional",
        "length",
        "traversal_time",
        "stair_count",
        "max_slope",
        "min_width",
        "signposted_as",
        "reversed_signposted_as",
    ];
}

impl Id for Pathway {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A level inside a station. Maps one row of `levels.txt`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Level {
    /// Unique technical identifier of the level
    #[serde(rename = "level_id")]
    pub id: String,
    /// Numeric index of the level; ground level is 0, levels above are positive
    #[serde(rename = "level_index")]
    pub index: f64,
    /// Name of the level as seen by the rider
    #[serde(rename = "level_name")]
    pub name: Option<String>,
}

impl Level {
    pub const FIELDS: &'static [&'static str] = &["level_id", "level_index", "level_name"];
}

impl Id for Level {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One possible fare as read from `fare_attributes.txt`
#[derive(Debug, Deserialize, Clone)]
pub struct RawFareAttribute {
    /// Unique technical identifier of the fare
    #[serde(rename = "fare_id")]
    pub id: String,
    /// Fare price, in the unit specified by the currency
    pub price: String,
    /// Currency used to pay the fare
    #[serde(rename = "currency_type")]
    pub currency: String,
    /// When the fare must be paid
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Number of transfers permitted on this fare
    #[serde(default)]
    pub transfers: FareTransfers,
    /// The agency the fare applies to
    pub agency_id: Option<String>,
    /// Length of time in seconds before a transfer expires
    pub transfer_duration: Option<u32>,
}

impl RawFareAttribute {
    pub const FIELDS: &'static [&'static str] = &[
        "fare_id",
        "price",
        "currency_type",
        "payment_method",
        "transfers",
        "agency_id",
        "transfer_duration",
    ];
}

/// A rule restricting where a fare applies.
/// Maps one row of `fare_rules.txt`
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct FareRule {
    /// The fare the rule belongs to
    pub fare_id: String,
    /// Route the fare applies to
    pub route_id: Option<String>,
    /// Origin zone
    pub origin_id: Option<String>,
    /// Destination zone
    pub destination_id: Option<String>,
    /// Zone the itinerary passes through
    pub contains_id: Option<String>,
}

/// A dataset attribution. Maps one row of `attributions.txt`
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Attribution {
    #[serde(rename = "attribution_id")]
    pub id: Option<String>,
    /// Agency the attribution applies to
    pub agency_id: Option<String>,
    /// Route the attribution applies to
    pub route_id: Option<String>,
    /// Trip the attribution applies to
    pub trip_id: Option<String>,
    /// The entity being attributed
    pub organization_name: String,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub is_producer: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub is_operator: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub is_authority: Option<bool>,
    pub attribution_url: Option<String>,
    pub attribution_email: Option<String>,
    pub attribution_phone: Option<String>,
}
