use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::search::{validate_iata, CabinClass, SearchSegment, Travellers};
use crate::{invalid, CoreResult};

/// What a customer is enquiring about. Each product kind carries its own
/// shape; callers match exhaustively instead of probing loose JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnquiryProduct {
    Flight(FlightRequest),
    Hotel(HotelStayRequest),
    Holiday(HolidayPackage),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightRequest {
    pub segments: Vec<SearchSegment>,
    pub travellers: Travellers,
    pub cabin_class: CabinClass,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotelStayRequest {
    pub country_code: String,
    pub city_code: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: u32,
    pub guests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HolidayPackage {
    pub package_code: String,
    pub destination: String,
    pub nights: u32,
    pub travellers: Travellers,
    #[serde(default)]
    pub inclusions: Vec<String>,
}

impl EnquiryProduct {
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            EnquiryProduct::Flight(flight) => {
                if flight.segments.is_empty() {
                    return Err(invalid("flight enquiry needs at least one segment"));
                }
                for segment in &flight.segments {
                    validate_iata(&segment.origin)?;
                    validate_iata(&segment.destination)?;
                }
                flight.travellers.validate()
            }
            EnquiryProduct::Hotel(stay) => {
                if stay.check_out <= stay.check_in {
                    return Err(invalid("check-out must be after check-in"));
                }
                if stay.rooms == 0 || stay.guests < stay.rooms {
                    return Err(invalid("every room needs at least one guest"));
                }
                Ok(())
            }
            EnquiryProduct::Holiday(package) => {
                if package.package_code.trim().is_empty() {
                    return Err(invalid("package code is required"));
                }
                if package.nights == 0 {
                    return Err(invalid("a holiday lasts at least one night"));
                }
                package.travellers.validate()
            }
        }
    }

    pub fn title(&self) -> String {
        match self {
            EnquiryProduct::Flight(flight) => {
                let route: Vec<String> = flight
                    .segments
                    .iter()
                    .map(|s| format!("{}→{}", s.origin, s.destination))
                    .collect();
                format!("Flight {} ({})", route.join(", "), flight.cabin_class.as_str())
            }
            EnquiryProduct::Hotel(stay) => format!(
                "Hotel in {} {} to {}",
                stay.city_code, stay.check_in, stay.check_out
            ),
            EnquiryProduct::Holiday(package) => format!(
                "{} holiday, {} nights ({})",
                package.destination, package.nights, package.package_code
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_holiday_package() {
        let json = r#"
            {
                "type": "HOLIDAY",
                "packageCode": "MLD-5N",
                "destination": "Maldives",
                "nights": 5,
                "travellers": {"adult": 2},
                "inclusions": ["flights", "half board"]
            }
        "#;
        let product: EnquiryProduct = serde_json::from_str(json).expect("Failed to deserialize");
        assert!(product.validate().is_ok());
        assert_eq!(product.title(), "Maldives holiday, 5 nights (MLD-5N)");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type": "CRUISE", "ship": "x"}"#;
        assert!(serde_json::from_str::<EnquiryProduct>(json).is_err());
    }

    #[test]
    fn test_hotel_stay_validation() {
        let stay = EnquiryProduct::Hotel(HotelStayRequest {
            country_code: "AE".to_string(),
            city_code: "DXB".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 3, 18).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            rooms: 1,
            guests: 2,
        });
        assert!(stay.validate().is_err());
    }
}
