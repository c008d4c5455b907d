use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::booking::PackageDetails;
use crate::money::validate_currency;
use crate::{invalid, CoreResult};

pub const MAX_SEATED_TRAVELLERS: u32 = 9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CabinClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premiumEconomy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "economy" => Some(CabinClass::Economy),
            "premiumEconomy" => Some(CabinClass::PremiumEconomy),
            "business" => Some(CabinClass::Business),
            "first" => Some(CabinClass::First),
            _ => None,
        }
    }
}

// ============================================================================
// Flight search (ODIS wire format)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchSegment {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Travellers {
    pub adult: u32,
    #[serde(default)]
    pub child: u32,
    #[serde(default)]
    pub infant: u32,
}

impl Travellers {
    /// Infants travel on a lap and do not take a seat.
    pub fn seated(&self) -> u32 {
        self.adult + self.child
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.adult == 0 {
            return Err(invalid("at least one adult traveller is required"));
        }
        if self.infant > self.adult {
            return Err(invalid("each infant must travel with an adult"));
        }
        if self.seated() > MAX_SEATED_TRAVELLERS {
            return Err(invalid(format!(
                "at most {} seated travellers per search",
                MAX_SEATED_TRAVELLERS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub segments: Vec<SearchSegment>,
    pub travellers: Travellers,
    pub cabin_class: CabinClass,
    pub currency: String,
}

impl SearchCriteria {
    pub fn validate(&self) -> CoreResult<()> {
        if self.segments.is_empty() {
            return Err(invalid("at least one segment is required"));
        }
        for segment in &self.segments {
            validate_iata(&segment.origin)?;
            validate_iata(&segment.destination)?;
            if segment.origin == segment.destination {
                return Err(invalid(format!(
                    "segment origin and destination are both {}",
                    segment.origin
                )));
            }
        }
        self.travellers.validate()?;
        validate_currency(&self.currency)
    }
}

pub fn validate_iata(code: &str) -> CoreResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(invalid(format!("'{}' is not an IATA location code", code)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FareBreakdown {
    pub base_amount: i64,
    pub tax_amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightLeg {
    pub carrier: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: NaiveDateTime,
    pub arrival_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub itinerary_id: String,
    pub validating_carrier: String,
    pub fare: FareBreakdown,
    pub legs: Vec<FlightLeg>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightSearchResult {
    #[serde(rename = "sId")]
    pub s_id: String,
    pub itineraries: Vec<Itinerary>,
}

impl FlightSearchResult {
    pub fn find_itinerary(&self, itinerary_id: &str) -> Option<&Itinerary> {
        self.itineraries.iter().find(|i| i.itinerary_id == itinerary_id)
    }
}

// ============================================================================
// Hotel search
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomOccupancy {
    pub adults: u32,
    #[serde(default)]
    pub child_ages: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotelSearchCriteria {
    pub country_code: String,
    pub city_code: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: Vec<RoomOccupancy>,
    pub currency: String,
}

impl HotelSearchCriteria {
    pub fn validate(&self) -> CoreResult<()> {
        if self.check_out <= self.check_in {
            return Err(invalid("check-out must be after check-in"));
        }
        if self.rooms.is_empty() {
            return Err(invalid("at least one room is required"));
        }
        if self.rooms.iter().any(|r| r.adults == 0) {
            return Err(invalid("every room needs at least one adult"));
        }
        if self.country_code.len() != 2 {
            return Err(invalid("country code must be ISO-3166 alpha-2"));
        }
        validate_currency(&self.currency)
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotelOffer {
    pub offer_id: String,
    pub net_price: i64,
    pub vat_amount: i64,
    pub currency: String,
    pub package: PackageDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotelResult {
    pub hotel_id: String,
    pub hotel_name: String,
    pub country_code: String,
    pub offers: Vec<HotelOffer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotelSearchResult {
    #[serde(rename = "sId")]
    pub s_id: String,
    pub hotels: Vec<HotelResult>,
}

impl HotelSearchResult {
    pub fn find_offer(&self, hotel_id: &str, offer_id: &str) -> Option<(&HotelResult, &HotelOffer)> {
        let hotel = self.hotels.iter().find(|h| h.hotel_id == hotel_id)?;
        let offer = hotel.offers.iter().find(|o| o.offer_id == offer_id)?;
        Some((hotel, offer))
    }
}

/// What a search returned, kept under its `sId` so a later booking can be
/// checked against the exact priced result the customer saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchSession {
    Flight {
        criteria: SearchCriteria,
        result: FlightSearchResult,
    },
    Hotel {
        criteria: HotelSearchCriteria,
        result: HotelSearchResult,
    },
}

impl SearchSession {
    pub fn s_id(&self) -> &str {
        match self {
            SearchSession::Flight { result, .. } => &result.s_id,
            SearchSession::Hotel { result, .. } => &result.s_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            segments: vec![SearchSegment {
                origin: "RUH".to_string(),
                destination: "DXB".to_string(),
                departure_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            }],
            travellers: Travellers { adult: 1, child: 0, infant: 0 },
            cabin_class: CabinClass::Economy,
            currency: "SAR".to_string(),
        }
    }

    #[test]
    fn test_criteria_wire_format() {
        let json = serde_json::to_value(criteria()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "segments": [{"origin": "RUH", "destination": "DXB", "departureDate": "2026-03-15"}],
                "travellers": {"adult": 1, "child": 0, "infant": 0},
                "cabinClass": "economy",
                "currency": "SAR"
            })
        );
    }

    #[test]
    fn test_criteria_validation() {
        assert!(criteria().validate().is_ok());

        let mut same_airport = criteria();
        same_airport.segments[0].destination = "RUH".to_string();
        assert!(same_airport.validate().is_err());

        let mut no_adult = criteria();
        no_adult.travellers = Travellers { adult: 0, child: 1, infant: 0 };
        assert!(no_adult.validate().is_err());

        let mut lap_overflow = criteria();
        lap_overflow.travellers = Travellers { adult: 1, child: 0, infant: 2 };
        assert!(lap_overflow.validate().is_err());

        let mut lowercase = criteria();
        lowercase.segments[0].origin = "ruh".to_string();
        assert!(lowercase.validate().is_err());
    }

    #[test]
    fn test_travellers_defaults() {
        let travellers: Travellers = serde_json::from_str(r#"{"adult": 2}"#).unwrap();
        assert_eq!(travellers, Travellers { adult: 2, child: 0, infant: 0 });
    }

    #[test]
    fn test_hotel_criteria_dates() {
        let mut hotel = HotelSearchCriteria {
            country_code: "AE".to_string(),
            city_code: "DXB".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 3, 18).unwrap(),
            rooms: vec![RoomOccupancy { adults: 2, child_ages: vec![] }],
            currency: "SAR".to_string(),
        };
        assert!(hotel.validate().is_ok());
        assert_eq!(hotel.nights(), 3);

        hotel.check_out = hotel.check_in;
        assert!(hotel.validate().is_err());
    }
}
