use chrono::{DateTime, NaiveDate, Utc};
use safar_shared::Masked;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::money::validate_currency;
use crate::search::{validate_iata, CabinClass};
use crate::{invalid, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Failed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "FAILED" => Some(BookingStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Pending, BookingStatus::Failed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingKind {
    Flight,
    Hotel,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::Flight => "FLIGHT",
            BookingKind::Hotel => "HOTEL",
        }
    }
}

/// Link from an enquiry to the booking records it pays for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BookingRef {
    pub kind: BookingKind,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    pub email: Masked<String>,
    pub telephone: Masked<String>,
}

impl ContactDetails {
    fn validate(&self) -> CoreResult<()> {
        if !self.email.expose().contains('@') {
            return Err(invalid("contact email is not an address"));
        }
        if self.telephone.expose().trim().is_empty() {
            return Err(invalid("contact telephone is required"));
        }
        Ok(())
    }
}

// ============================================================================
// Flight bookings
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PassengerType {
    #[serde(rename = "ADT")]
    Adult,
    #[serde(rename = "CHD")]
    Child,
    #[serde(rename = "INF")]
    Infant,
}

impl PassengerType {
    pub fn code(&self) -> &'static str {
        match self {
            PassengerType::Adult => "ADT",
            PassengerType::Child => "CHD",
            PassengerType::Infant => "INF",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "ADT" => Some(PassengerType::Adult),
            "CHD" => Some(PassengerType::Child),
            "INF" => Some(PassengerType::Infant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelDocument {
    pub document_type: String,
    pub number: Masked<String>,
    pub issuing_country: String,
    pub expiry_date: NaiveDate,
}

/// Assigned by the airline after ticketing; the only passenger fields that
/// change after the booking is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketInfo {
    pub e_ticket_number: Option<String>,
    pub pnr: Option<String>,
    pub ticket_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub passenger_index: u32,
    #[serde(rename = "type")]
    pub passenger_type: PassengerType,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub nationality: String,
    pub document: TravelDocument,
    #[serde(default)]
    pub ticket: TicketInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFlightBooking {
    pub s_id: String,
    pub user_id: Uuid,
    pub enquiry_id: Option<Uuid>,
    pub itinerary_ref: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub cabin_class: CabinClass,
    pub currency: String,
    pub base_amount: i64,
    pub tax_amount: i64,
    pub service_fee: i64,
    pub contact: ContactDetails,
    pub passengers: Vec<Passenger>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightBooking {
    #[serde(rename = "bId")]
    pub id: Uuid,
    #[serde(rename = "sId")]
    pub s_id: String,
    pub user_id: Uuid,
    pub enquiry_id: Option<Uuid>,
    pub currency: String,
    pub base_amount: i64,
    pub tax_amount: i64,
    pub service_fee: i64,
    pub total_amount: i64,
    pub booking_status: BookingStatus,
    pub itinerary_ref: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub cabin_class: CabinClass,
    pub contact: ContactDetails,
    pub passengers: Vec<Passenger>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlightBooking {
    pub fn new(draft: NewFlightBooking, now: DateTime<Utc>) -> CoreResult<Self> {
        let total_amount = draft
            .base_amount
            .checked_add(draft.tax_amount)
            .and_then(|sum| sum.checked_add(draft.service_fee))
            .ok_or_else(|| invalid("fare components overflow"))?;

        let booking = Self {
            id: Uuid::new_v4(),
            s_id: draft.s_id,
            user_id: draft.user_id,
            enquiry_id: draft.enquiry_id,
            currency: draft.currency,
            base_amount: draft.base_amount,
            tax_amount: draft.tax_amount,
            service_fee: draft.service_fee,
            total_amount,
            booking_status: BookingStatus::Pending,
            itinerary_ref: draft.itinerary_ref,
            origin: draft.origin,
            destination: draft.destination,
            departure_date: draft.departure_date,
            cabin_class: draft.cabin_class,
            contact: draft.contact,
            passengers: draft.passengers,
            created_at: now,
            updated_at: now,
        };
        booking.validate()?;
        Ok(booking)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.s_id.trim().is_empty() {
            return Err(invalid("sId is required"));
        }
        validate_currency(&self.currency)?;
        if self.base_amount < 0 || self.tax_amount < 0 || self.service_fee < 0 {
            return Err(invalid("fare components must not be negative"));
        }
        if Some(self.total_amount)
            != self
                .base_amount
                .checked_add(self.tax_amount)
                .and_then(|s| s.checked_add(self.service_fee))
        {
            return Err(invalid(format!(
                "totalAmount {} != baseAmount {} + taxAmount {} + serviceFee {}",
                self.total_amount, self.base_amount, self.tax_amount, self.service_fee
            )));
        }
        validate_iata(&self.origin)?;
        validate_iata(&self.destination)?;
        if self.origin == self.destination {
            return Err(invalid("origin and destination must differ"));
        }
        self.contact.validate()?;

        if self.passengers.is_empty() {
            return Err(invalid("a flight booking needs at least one passenger"));
        }
        let mut seen = HashSet::new();
        for passenger in &self.passengers {
            if !seen.insert(passenger.passenger_index) {
                return Err(invalid(format!(
                    "passengerIndex {} is used twice",
                    passenger.passenger_index
                )));
            }
            if passenger.first_name.trim().is_empty() || passenger.last_name.trim().is_empty() {
                return Err(invalid(format!(
                    "passenger {} is missing a name",
                    passenger.passenger_index
                )));
            }
            if passenger.document.number.expose().trim().is_empty() {
                return Err(invalid(format!(
                    "passenger {} is missing a document number",
                    passenger.passenger_index
                )));
            }
            if passenger.document.expiry_date < self.departure_date {
                return Err(invalid(format!(
                    "passenger {} document expires before departure",
                    passenger.passenger_index
                )));
            }
        }

        let adults = self.count(PassengerType::Adult);
        if adults == 0 {
            return Err(invalid("at least one ADT passenger is required"));
        }
        if self.count(PassengerType::Infant) > adults {
            return Err(invalid("each INF passenger must be accompanied by an ADT"));
        }
        Ok(())
    }

    fn count(&self, passenger_type: PassengerType) -> usize {
        self.passengers
            .iter()
            .filter(|p| p.passenger_type == passenger_type)
            .count()
    }

    pub fn reference(&self) -> BookingRef {
        BookingRef {
            kind: BookingKind::Flight,
            id: self.id,
        }
    }
}

// ============================================================================
// Hotel bookings
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomBasis {
    RoomOnly,
    BedAndBreakfast,
    HalfBoard,
    FullBoard,
    AllInclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetails {
    pub refundable: bool,
    pub room_basis: RoomBasis,
    pub cancellation_deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: Option<String>,
    pub country_code: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuestType {
    Adult,
    Child,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub pax_id: u32,
    pub room_id: u32,
    pub is_lead_guest: bool,
    pub guest_type: GuestType,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub address: Address,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHotelBooking {
    pub s_id: String,
    pub user_id: Uuid,
    pub enquiry_id: Option<Uuid>,
    pub hotel_id: String,
    pub hotel_name: String,
    pub country_code: String,
    pub currency: String,
    pub net_price: i64,
    pub vat_amount: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_rooms: u32,
    pub package_details: PackageDetails,
    pub guests: Vec<Guest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBooking {
    #[serde(rename = "bId")]
    pub id: Uuid,
    #[serde(rename = "sId")]
    pub s_id: String,
    pub user_id: Uuid,
    pub enquiry_id: Option<Uuid>,
    pub hotel_id: String,
    pub hotel_name: String,
    pub country_code: String,
    pub booking_reference: Option<String>,
    pub currency: String,
    pub net_price: i64,
    pub vat_amount: i64,
    pub total_amount: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_nights: i64,
    pub number_of_rooms: u32,
    pub package_details: PackageDetails,
    pub guests: Vec<Guest>,
    pub booking_status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HotelBooking {
    pub fn new(draft: NewHotelBooking, now: DateTime<Utc>) -> CoreResult<Self> {
        let total_amount = draft
            .net_price
            .checked_add(draft.vat_amount)
            .ok_or_else(|| invalid("price components overflow"))?;

        let booking = Self {
            id: Uuid::new_v4(),
            s_id: draft.s_id,
            user_id: draft.user_id,
            enquiry_id: draft.enquiry_id,
            hotel_id: draft.hotel_id,
            hotel_name: draft.hotel_name,
            country_code: draft.country_code,
            booking_reference: None,
            currency: draft.currency,
            net_price: draft.net_price,
            vat_amount: draft.vat_amount,
            total_amount,
            check_in_date: draft.check_in_date,
            check_out_date: draft.check_out_date,
            number_of_nights: (draft.check_out_date - draft.check_in_date).num_days(),
            number_of_rooms: draft.number_of_rooms,
            package_details: draft.package_details,
            guests: draft.guests,
            booking_status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        booking.validate()?;
        Ok(booking)
    }

    pub fn derived_nights(&self) -> i64 {
        (self.check_out_date - self.check_in_date).num_days()
    }

    pub fn lead_guest(&self) -> Option<&Guest> {
        self.guests.iter().find(|g| g.is_lead_guest)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.s_id.trim().is_empty() {
            return Err(invalid("sId is required"));
        }
        validate_currency(&self.currency)?;
        if self.net_price < 0 || self.vat_amount < 0 {
            return Err(invalid("price components must not be negative"));
        }
        if Some(self.total_amount) != self.net_price.checked_add(self.vat_amount) {
            return Err(invalid(format!(
                "totalAmount {} != netPrice {} + vatAmount {}",
                self.total_amount, self.net_price, self.vat_amount
            )));
        }
        if self.check_out_date <= self.check_in_date {
            return Err(invalid("checkOutDate must be after checkInDate"));
        }
        if self.number_of_nights != self.derived_nights() {
            return Err(invalid("numberOfNights does not match the stay dates"));
        }
        if self.number_of_rooms == 0 {
            return Err(invalid("at least one room is required"));
        }

        if self.guests.is_empty() {
            return Err(invalid("a hotel booking needs at least one guest"));
        }
        let leads = self.guests.iter().filter(|g| g.is_lead_guest).count();
        if leads != 1 {
            return Err(invalid(format!(
                "exactly one lead guest is required, found {}",
                leads
            )));
        }
        if self
            .lead_guest()
            .is_some_and(|g| g.guest_type != GuestType::Adult)
        {
            return Err(invalid("the lead guest must be an adult"));
        }

        let mut pax_ids = HashSet::new();
        let mut occupied = BTreeSet::new();
        for guest in &self.guests {
            if !pax_ids.insert(guest.pax_id) {
                return Err(invalid(format!("paxId {} is used twice", guest.pax_id)));
            }
            if guest.room_id == 0 || guest.room_id > self.number_of_rooms {
                return Err(invalid(format!(
                    "guest {} is assigned to room {} of {}",
                    guest.pax_id, guest.room_id, self.number_of_rooms
                )));
            }
            occupied.insert(guest.room_id);
        }
        if occupied.len() as u32 != self.number_of_rooms {
            return Err(invalid("every room needs at least one guest"));
        }
        Ok(())
    }

    pub fn reference(&self) -> BookingRef {
        BookingRef {
            kind: BookingKind::Hotel,
            id: self.id,
        }
    }
}

/// Row shape for "my bookings" listings across both booking kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub kind: BookingKind,
    #[serde(rename = "bId")]
    pub id: Uuid,
    #[serde(rename = "sId")]
    pub s_id: String,
    pub enquiry_id: Option<Uuid>,
    pub title: String,
    pub status: BookingStatus,
    pub total_amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<&FlightBooking> for BookingSummary {
    fn from(b: &FlightBooking) -> Self {
        Self {
            kind: BookingKind::Flight,
            id: b.id,
            s_id: b.s_id.clone(),
            enquiry_id: b.enquiry_id,
            title: format!("{} → {} on {}", b.origin, b.destination, b.departure_date),
            status: b.booking_status,
            total_amount: b.total_amount,
            currency: b.currency.clone(),
            created_at: b.created_at,
        }
    }
}

impl From<&HotelBooking> for BookingSummary {
    fn from(b: &HotelBooking) -> Self {
        Self {
            kind: BookingKind::Hotel,
            id: b.id,
            s_id: b.s_id.clone(),
            enquiry_id: b.enquiry_id,
            title: format!("{}, {} night(s)", b.hotel_name, b.number_of_nights),
            status: b.booking_status,
            total_amount: b.total_amount,
            currency: b.currency.clone(),
            created_at: b.created_at,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_flight_total_is_sum_of_components() {
        let booking = FlightBooking::new(new_flight(), Utc::now()).unwrap();
        assert_eq!(booking.total_amount, 85_000 + 12_750 + 2_500);
        assert_eq!(booking.booking_status, BookingStatus::Pending);

        let mut tampered = booking.clone();
        tampered.total_amount += 1;
        assert!(tampered.validate().is_err());
    }

    #[test]
    fn test_passenger_index_unique() {
        let mut draft = new_flight();
        draft.passengers.push(passenger(1, PassengerType::Child));
        assert!(FlightBooking::new(draft, Utc::now()).is_err());
    }

    #[test]
    fn test_infants_need_adults() {
        let mut draft = new_flight();
        draft.passengers.push(passenger(2, PassengerType::Infant));
        assert!(FlightBooking::new(draft.clone(), Utc::now()).is_ok());

        draft.passengers.push(passenger(3, PassengerType::Infant));
        assert!(FlightBooking::new(draft, Utc::now()).is_err());
    }

    #[test]
    fn test_passenger_type_codes() {
        let json = serde_json::to_value(passenger(1, PassengerType::Child)).unwrap();
        assert_eq!(json["type"], "CHD");
        assert_eq!(PassengerType::parse("INF"), Some(PassengerType::Infant));
    }

    #[test]
    fn test_flight_wire_ids() {
        let booking = FlightBooking::new(new_flight(), Utc::now()).unwrap();
        let json = serde_json::to_value(&booking).unwrap();
        assert_eq!(json["bId"], booking.id.to_string());
        assert_eq!(json["sId"], "odis-s-1");
        assert_eq!(json["bookingStatus"], "PENDING");
    }

    #[test]
    fn test_hotel_total_and_nights() {
        let booking = HotelBooking::new(new_hotel(), Utc::now()).unwrap();
        assert_eq!(booking.total_amount, 126_000);
        assert_eq!(booking.number_of_nights, 3);
        assert!(booking.check_out_date > booking.check_in_date);
    }

    #[test]
    fn test_hotel_dates_must_be_ordered() {
        let mut draft = new_hotel();
        draft.check_out_date = draft.check_in_date;
        assert!(HotelBooking::new(draft, Utc::now()).is_err());
    }

    #[test]
    fn test_exactly_one_lead_guest() {
        let mut none = new_hotel();
        none.guests = vec![guest(1, 1, false), guest(2, 1, false)];
        assert!(HotelBooking::new(none, Utc::now()).is_err());

        let mut two = new_hotel();
        two.guests = vec![guest(1, 1, true), guest(2, 1, true)];
        assert!(HotelBooking::new(two, Utc::now()).is_err());
    }

    #[test]
    fn test_every_room_is_occupied() {
        let mut draft = new_hotel();
        draft.number_of_rooms = 2;
        assert!(HotelBooking::new(draft.clone(), Utc::now()).is_err());

        draft.guests = vec![guest(1, 1, true), guest(2, 2, false)];
        assert!(HotelBooking::new(draft, Utc::now()).is_ok());
    }

    #[test]
    fn test_booking_status_transitions() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Confirmed));
        assert!(!BookingStatus::Failed.can_transition_to(BookingStatus::Confirmed));
    }
}
