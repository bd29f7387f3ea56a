use chrono::NaiveDate;
use rgb::RGB8;
use serde::de::{self, Deserialize, Deserializer};

use crate::error::Error;

/// Parses a YYYYMMDD date field
pub fn parse_date(s: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| Error::InvalidDate(s.to_owned()))
}

/// Formats a date back to the YYYYMMDD field encoding
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date(&s).map_err(de::Error::custom)
}

fn parse_time_impl(h: &str, m: &str, s: &str) -> Result<u32, std::num::ParseIntError> {
    let hours: u32 = h.parse()?;
    let minutes: u32 = m.parse()?;
    let seconds: u32 = s.parse()?;
    Ok(hours * 3600 + minutes * 60 + seconds)
}

/// Parses a HH:MM:SS time field to seconds since midnight. Hours may
/// exceed 24 for times past the end of the service day
pub fn parse_time(s: &str) -> Result<u32, Error> {
    let len = s.len();

    if len < 7 || len > 8 {
        Err(Error::InvalidTime(s.to_owned()))
    } else {
        let sec = &s[len - 2..];
        let min = &s[len - 5..len - 3];
        let hour = &s[..len - 6];
        parse_time_impl(hour, min, sec).map_err(|_| Error::InvalidTime(s.to_owned()))
    }
}

/// Formats seconds since midnight back to HH:MM:SS
pub fn format_time(time: u32) -> String {
    format!("{:02}:{:02}:{:02}", time / 3600, time % 3600 / 60, time % 60)
}

pub fn deserialize_optional_time<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;

    match s.as_deref() {
        None | Some("") => Ok(None),
        Some(t) => parse_time(t).map(Some).map_err(de::Error::custom),
    }
}

pub fn deserialize_time<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_time(&s).map_err(de::Error::custom)
}

pub fn de_with_optional_float<'de, D>(de: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de).and_then(|s| {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            s.trim().parse().map(Some).map_err(de::Error::custom)
        }
    })
}

pub fn de_with_optional_f32<'de, D>(de: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de).and_then(|s| {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            s.trim().parse().map(Some).map_err(de::Error::custom)
        }
    })
}

/// Parses a RRGGBB color field; an empty value falls back to `default`
pub fn parse_color(s: &str, default: impl FnOnce() -> RGB8) -> Result<RGB8, Error> {
    if s.is_empty() {
        return Ok(default());
    }
    if s.len() != 6 {
        return Err(Error::InvalidColor(s.to_owned()));
    }
    let r = u8::from_str_radix(&s[0..2], 16).map_err(|_| Error::InvalidColor(s.to_owned()))?;
    let g = u8::from_str_radix(&s[2..4], 16).map_err(|_| Error::InvalidColor(s.to_owned()))?;
    let b = u8::from_str_radix(&s[4..6], 16).map_err(|_| Error::InvalidColor(s.to_owned()))?;
    Ok(RGB8::new(r, g, b))
}

/// Formats a color back to the RRGGBB field encoding
pub fn format_color(color: &RGB8) -> String {
    format!("{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}

pub fn default_route_color() -> RGB8 {
    RGB8::new(255, 255, 255)
}

pub fn deserialize_route_color<'de, D>(de: D) -> Result<RGB8, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de)
        .and_then(|s| parse_color(&s, default_route_color).map_err(de::Error::custom))
}

pub fn deserialize_route_text_color<'de, D>(de: D) -> Result<RGB8, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de).and_then(|s| parse_color(&s, RGB8::default).map_err(de::Error::custom))
}

pub fn de_with_empty_default<'de, T: Default, D>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(|opt| opt.unwrap_or_default())
}

pub fn deserialize_optional_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s.as_deref() {
        None | Some("") => Ok(None),
        Some("0") => Ok(Some(false)),
        Some("1") => Ok(Some(true)),
        Some(s) => Err(de::Error::custom(format!(
            "invalid value `{}`, expected 0 or 1",
            s
        ))),
    }
}

pub fn deserialize_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "0" => Ok(false),
        "1" => Ok(true),
        s => Err(de::Error::custom(format!(
            "invalid value `{}`, expected 0 or 1",
            s
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_round_trip() {
        assert_eq!(parse_time("01:01:01").unwrap(), 3661);
        assert_eq!(parse_time("25:10:00").unwrap(), 25 * 3600 + 600);
        assert_eq!(format_time(3661), "01:01:01");
        assert_eq!(format_time(25 * 3600 + 600), "25:10:00");
        assert!(parse_time("1:1:1").is_err());
    }

    #[test]
    fn date_round_trip() {
        let d = parse_date("20160814").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2016, 8, 14).unwrap());
        assert_eq!(format_date(&d), "20160814");
    }

    #[test]
    fn color_round_trip() {
        let c = parse_color("FF00AB", RGB8::default).unwrap();
        assert_eq!(format_color(&c), "FF00AB");
        assert_eq!(parse_color("", || RGB8::new(1, 2, 3)).unwrap(), RGB8::new(1, 2, 3));
        assert!(parse_color("XYZXYZ", RGB8::default).is_err());
    }
}
