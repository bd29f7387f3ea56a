use serde::de::{Deserialize, Deserializer};

fn invalid_enum_value<E: serde::de::Error>(name: &str, s: &str) -> E {
    E::custom(format!("invalid value for {}, must be an integer: {}", name, s))
}

/// Describes the kind of a stop. See `location_type` in `stops.txt`
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LocationType {
    /// Stop or platform. A location where passengers board or disembark
    #[default]
    StopPoint,
    /// Station. A physical structure or area that contains one or more platforms
    Station,
    /// A location where passengers can enter or exit a station from the street
    Entrance,
    /// A location within a station, not matching any other type, used to link pathways
    GenericNode,
    /// A specific location on a platform where passengers can board and/or alight
    BoardingArea,
    /// An unknown value
    Unknown(i32),
}

impl LocationType {
    pub fn value(&self) -> i32 {
        match self {
            LocationType::StopPoint => 0,
            LocationType::Station => 1,
            LocationType::Entrance => 2,
            LocationType::GenericNode => 3,
            LocationType::BoardingArea => 4,
            LocationType::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for LocationType {
    fn deserialize<D>(deserializer: D) -> Result<LocationType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "" | "0" => LocationType::StopPoint,
            "1" => LocationType::Station,
            "2" => LocationType::Entrance,
            "3" => LocationType::GenericNode,
            "4" => LocationType::BoardingArea,
            s => LocationType::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("LocationType", s))?,
            ),
        })
    }
}

/// Generic enum for availability-style flags (`wheelchair_boarding`,
/// `wheelchair_accessible`): 0 = no information, 1 = available, 2 = not available
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Availability {
    #[default]
    InformationNotAvailable,
    Available,
    NotAvailable,
    Unknown(i32),
}

impl Availability {
    pub fn value(&self) -> i32 {
        match self {
            Availability::InformationNotAvailable => 0,
            Availability::Available => 1,
            Availability::NotAvailable => 2,
            Availability::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for Availability {
    fn deserialize<D>(deserializer: D) -> Result<Availability, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "" | "0" => Availability::InformationNotAvailable,
            "1" => Availability::Available,
            "2" => Availability::NotAvailable,
            s => Availability::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("Availability", s))?,
            ),
        })
    }
}

/// `bikes_allowed`: 0 = no information, 1 = allowed, 2 = not allowed
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BikesAllowed {
    #[default]
    NoBikeInfo,
    Allowed,
    NotAllowed,
    Unknown(i32),
}

impl BikesAllowed {
    pub fn value(&self) -> i32 {
        match self {
            BikesAllowed::NoBikeInfo => 0,
            BikesAllowed::Allowed => 1,
            BikesAllowed::NotAllowed => 2,
            BikesAllowed::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for BikesAllowed {
    fn deserialize<D>(deserializer: D) -> Result<BikesAllowed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "" | "0" => BikesAllowed::NoBikeInfo,
            "1" => BikesAllowed::Allowed,
            "2" => BikesAllowed::NotAllowed,
            s => BikesAllowed::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("BikesAllowed", s))?,
            ),
        })
    }
}

/// `pickup_type` / `drop_off_type` on a stop time
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PickupDropOffType {
    /// Regularly scheduled pickup or drop off (default)
    #[default]
    Regular,
    /// No pickup or drop off available
    NotAvailable,
    /// Must phone the agency to arrange
    ArrangeByPhone,
    /// Must coordinate with the driver
    CoordinateWithDriver,
    Unknown(i32),
}

impl PickupDropOffType {
    pub fn value(&self) -> i32 {
        match self {
            PickupDropOffType::Regular => 0,
            PickupDropOffType::NotAvailable => 1,
            PickupDropOffType::ArrangeByPhone => 2,
            PickupDropOffType::CoordinateWithDriver => 3,
            PickupDropOffType::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for PickupDropOffType {
    fn deserialize<D>(deserializer: D) -> Result<PickupDropOffType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "" | "0" => PickupDropOffType::Regular,
            "1" => PickupDropOffType::NotAvailable,
            "2" => PickupDropOffType::ArrangeByPhone,
            "3" => PickupDropOffType::CoordinateWithDriver,
            s => PickupDropOffType::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("PickupDropOffType", s))?,
            ),
        })
    }
}

/// `continuous_pickup` / `continuous_drop_off`. Note that contrary to
/// [PickupDropOffType] the default is *not available* (1)
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContinuousPickupDropOff {
    /// Continuous stopping pickup or drop off
    Continuous,
    /// No continuous stopping (default)
    #[default]
    NotAvailable,
    /// Must phone the agency to arrange
    ArrangeByPhone,
    /// Must coordinate with the driver
    CoordinateWithDriver,
    Unknown(i32),
}

impl ContinuousPickupDropOff {
    pub fn value(&self) -> i32 {
        match self {
            ContinuousPickupDropOff::Continuous => 0,
            ContinuousPickupDropOff::NotAvailable => 1,
            ContinuousPickupDropOff::ArrangeByPhone => 2,
            ContinuousPickupDropOff::CoordinateWithDriver => 3,
            ContinuousPickupDropOff::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for ContinuousPickupDropOff {
    fn deserialize<D>(deserializer: D) -> Result<ContinuousPickupDropOff, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "0" => ContinuousPickupDropOff::Continuous,
            "" | "1" => ContinuousPickupDropOff::NotAvailable,
            "2" => ContinuousPickupDropOff::ArrangeByPhone,
            "3" => ContinuousPickupDropOff::CoordinateWithDriver,
            s => ContinuousPickupDropOff::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("ContinuousPickupDropOff", s))?,
            ),
        })
    }
}

/// `timepoint` on a stop time: times are exact (default) or approximate
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TimepointType {
    /// Times are considered approximate
    Approximate,
    /// Times are considered exact (default)
    #[default]
    Exact,
}

impl TimepointType {
    pub fn value(&self) -> i32 {
        match self {
            TimepointType::Approximate => 0,
            TimepointType::Exact => 1,
        }
    }
}

impl<'de> Deserialize<'de> for TimepointType {
    fn deserialize<D>(deserializer: D) -> Result<TimepointType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "" | "1" => Ok(TimepointType::Exact),
            "0" => Ok(TimepointType::Approximate),
            s => Err(invalid_enum_value("TimepointType", s)),
        }
    }
}

/// `direction_id` on a trip
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DirectionType {
    /// Travel in one direction, e.g. outbound travel
    Outbound,
    /// Travel in the opposite direction, e.g. inbound travel
    Inbound,
}

impl DirectionType {
    pub fn value(&self) -> i32 {
        match self {
            DirectionType::Outbound => 0,
            DirectionType::Inbound => 1,
        }
    }
}

impl<'de> Deserialize<'de> for DirectionType {
    fn deserialize<D>(deserializer: D) -> Result<DirectionType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "0" => Ok(DirectionType::Outbound),
            "1" => Ok(DirectionType::Inbound),
            s => Err(invalid_enum_value("DirectionType", s)),
        }
    }
}

/// `exception_type` in `calendar_dates.txt`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// Service is added for the date
    Added,
    /// Service is removed for the date
    Removed,
}

impl<'de> Deserialize<'de> for Exception {
    fn deserialize<D>(deserializer: D) -> Result<Exception, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "1" => Ok(Exception::Added),
            "2" => Ok(Exception::Removed),
            s => Err(invalid_enum_value("Exception", s)),
        }
    }
}

/// `payment_method` of a fare attribute
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Fare is paid on board (default)
    #[default]
    Aboard,
    /// Fare must be paid before boarding
    PreBoarding,
}

impl PaymentMethod {
    pub fn value(&self) -> i32 {
        match self {
            PaymentMethod::Aboard => 0,
            PaymentMethod::PreBoarding => 1,
        }
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D>(deserializer: D) -> Result<PaymentMethod, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "" | "0" => Ok(PaymentMethod::Aboard),
            "1" => Ok(PaymentMethod::PreBoarding),
            s => Err(invalid_enum_value("PaymentMethod", s)),
        }
    }
}

/// Number of transfers permitted on a fare. An empty value means unlimited
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FareTransfers {
    /// Unlimited transfers are permitted (empty field)
    #[default]
    Unlimited,
    /// No transfers permitted
    NoTransfers,
    /// One transfer permitted
    UniqueTransfer,
    /// Two transfers permitted
    TwoTransfers,
    Unknown(i32),
}

impl FareTransfers {
    /// The field value, or `None` for the empty unlimited encoding
    pub fn value(&self) -> Option<i32> {
        match self {
            FareTransfers::Unlimited => None,
            FareTransfers::NoTransfers => Some(0),
            FareTransfers::UniqueTransfer => Some(1),
            FareTransfers::TwoTransfers => Some(2),
            FareTransfers::Unknown(i) => Some(*i),
        }
    }
}

impl<'de> Deserialize<'de> for FareTransfers {
    fn deserialize<D>(deserializer: D) -> Result<FareTransfers, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(match s.as_deref() {
            None | Some("") => FareTransfers::Unlimited,
            Some("0") => FareTransfers::NoTransfers,
            Some("1") => FareTransfers::UniqueTransfer,
            Some("2") => FareTransfers::TwoTransfers,
            Some(s) => FareTransfers::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("FareTransfers", s))?,
            ),
        })
    }
}

/// `transfer_type` in `transfers.txt`
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TransferType {
    /// Recommended transfer point between routes (default)
    #[default]
    Recommended,
    /// Departing vehicle waits for arriving one
    Timed,
    /// Transfer requires a minimum amount of time
    MinTime,
    /// Transfer is not possible
    Impossible,
    Unknown(i32),
}

impl TransferType {
    pub fn value(&self) -> i32 {
        match self {
            TransferType::Recommended => 0,
            TransferType::Timed => 1,
            TransferType::MinTime => 2,
            TransferType::Impossible => 3,
            TransferType::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for TransferType {
    fn deserialize<D>(deserializer: D) -> Result<TransferType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "" | "0" => TransferType::Recommended,
            "1" => TransferType::Timed,
            "2" => TransferType::MinTime,
            "3" => TransferType::Impossible,
            s => TransferType::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("TransferType", s))?,
            ),
        })
    }
}

/// `pathway_mode` in `pathways.txt`
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PathwayMode {
    #[default]
    Walkway,
    Stairs,
    MovingSidewalk,
    Escalator,
    Elevator,
    FareGate,
    ExitGate,
    Unknown(i32),
}

impl PathwayMode {
    pub fn value(&self) -> i32 {
        match self {
            PathwayMode::Walkway => 1,
            PathwayMode::Stairs => 2,
            PathwayMode::MovingSidewalk => 3,
            PathwayMode::Escalator => 4,
            PathwayMode::Elevator => 5,
            PathwayMode::FareGate => 6,
            PathwayMode::ExitGate => 7,
            PathwayMode::Unknown(i) => *i,
        }
    }
}

impl<'de> Deserialize<'de> for PathwayMode {
    fn deserialize<D>(deserializer: D) -> Result<PathwayMode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "" | "1" => PathwayMode::Walkway,
            "2" => PathwayMode::Stairs,
            "3" => PathwayMode::MovingSidewalk,
            "4" => PathwayMode::Escalator,
            "5" => PathwayMode::Elevator,
            "6" => PathwayMode::FareGate,
            "7" => PathwayMode::ExitGate,
            s => PathwayMode::Unknown(
                s.parse()
                    .map_err(|_| invalid_enum_value("PathwayMode", s))?,
            ),
        })
    }
}

/// One of the twelve base transit modes. Extended route-type codes map onto
/// these; the mapping is used where two routes only need to agree on their
/// method of transportation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BaseRouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
    Trolleybus,
    Monorail,
    Coach,
    Taxi,
}

impl BaseRouteType {
    /// Maps an extended route-type code onto its base mode.
    ///
    /// Extended codes are grouped in blocks of one hundred, see
    /// <https://developers.google.com/transit/gtfs/reference/extended-route-types>
    pub fn from_extended(code: i16) -> BaseRouteType {
        if code < 100 {
            return match code {
                0 => BaseRouteType::Tram,
                1 => BaseRouteType::Subway,
                2 => BaseRouteType::Rail,
                4 => BaseRouteType::Ferry,
                5 => BaseRouteType::CableCar,
                6 => BaseRouteType::Gondola,
                7 => BaseRouteType::Funicular,
                11 => BaseRouteType::Trolleybus,
                12 => BaseRouteType::Monorail,
                _ => BaseRouteType::Bus,
            };
        }

        match code / 100 {
            1 | 3 => BaseRouteType::Rail,
            2 => BaseRouteType::Coach,
            4 | 5 | 6 => BaseRouteType::Subway,
            8 => BaseRouteType::Trolleybus,
            9 => BaseRouteType::Tram,
            10 | 12 => BaseRouteType::Ferry,
            13 => BaseRouteType::Gondola,
            14 => BaseRouteType::Funicular,
            15 => BaseRouteType::Taxi,
            _ => BaseRouteType::Bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_route_types_collapse_to_base_modes() {
        assert_eq!(BaseRouteType::from_extended(3), BaseRouteType::Bus);
        assert_eq!(BaseRouteType::from_extended(109), BaseRouteType::Rail);
        assert_eq!(BaseRouteType::from_extended(303), BaseRouteType::Rail);
        assert_eq!(BaseRouteType::from_extended(402), BaseRouteType::Subway);
        assert_eq!(BaseRouteType::from_extended(700), BaseRouteType::Bus);
        assert_eq!(BaseRouteType::from_extended(900), BaseRouteType::Tram);
        assert_eq!(BaseRouteType::from_extended(1501), BaseRouteType::Taxi);
        // suburban tram variants and plain tram agree
        assert_eq!(
            BaseRouteType::from_extended(906),
            BaseRouteType::from_extended(0)
        );
    }
}
