use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use safar_core::booking::{
    BookingRef, BookingSummary, ContactDetails, FlightBooking, Guest, HotelBooking, NewFlightBooking, NewHotelBooking,
    Passenger, PassengerType,
};
use safar_core::package::{EnquiryProduct, FlightRequest, HotelStayRequest};
use safar_core::search::SearchSession;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Session;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightBookingRequest {
    #[serde(rename = "sId")]
    pub s_id: String,
    pub itinerary_id: String,
    pub contact: ContactDetails,
    pub passengers: Vec<Passenger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBookingRequest {
    #[serde(rename = "sId")]
    pub s_id: String,
    pub hotel_id: String,
    pub offer_id: String,
    pub guests: Vec<Guest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated<B> {
    pub booking: B,
    pub enquiry_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_bookings))
        .route("/v1/bookings/flights", post(create_flight_booking))
        .route("/v1/bookings/flights/{id}", get(get_flight_booking))
        .route("/v1/bookings/hotels", post(create_hotel_booking))
        .route("/v1/bookings/hotels/{id}", get(get_hotel_booking))
}

async fn load_session(state: &AppState, s_id: &str) -> Result<SearchSession, AppError> {
    state
        .sessions
        .get_session(s_id)
        .await?
        .ok_or_else(|| AppError::ValidationError(format!("Search session {} has expired, search again", s_id)))
}

/// Opens the enquiry a freshly stored booking is paid through. If that fails
/// the booking is discarded, so no booking points at a missing enquiry.
async fn open_instant_enquiry(
    state: &AppState,
    enquiry_id: Uuid,
    user_id: Uuid,
    product: EnquiryProduct,
    amount: i64,
    currency: &str,
    booking: BookingRef,
) -> Result<(), AppError> {
    let opened = state
        .enquiries
        .open_instant(enquiry_id, user_id, product, amount, currency, vec![booking])
        .await;
    if let Err(e) = opened {
        error!("Opening enquiry {} for booking {} failed: {}", enquiry_id, booking.id, e);
        if let Err(discard) = state.bookings.discard_booking(booking).await {
            error!("Booking {} left without an enquiry: {}", booking.id, discard);
        }
        return Err(e.into());
    }
    Ok(())
}

// ============================================================================
// Flights
// ============================================================================

/// POST /v1/bookings/flights
///
/// Books an itinerary from a live search session and opens the instant
/// enquiry the customer then pays against.
async fn create_flight_booking(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<FlightBookingRequest>,
) -> Result<(StatusCode, Json<BookingCreated<FlightBooking>>), AppError> {
    let (criteria, result) = match load_session(&state, &req.s_id).await? {
        SearchSession::Flight { criteria, result } => (criteria, result),
        SearchSession::Hotel { .. } => {
            return Err(AppError::ValidationError(format!("{} is not a flight search", req.s_id)))
        }
    };
    let itinerary = result
        .find_itinerary(&req.itinerary_id)
        .ok_or_else(|| AppError::ValidationError(format!("Itinerary {} is not in search {}", req.itinerary_id, req.s_id)))?;

    let count = |t: PassengerType| req.passengers.iter().filter(|p| p.passenger_type == t).count() as u32;
    let travellers = criteria.travellers;
    if count(PassengerType::Adult) != travellers.adult
        || count(PassengerType::Child) != travellers.child
        || count(PassengerType::Infant) != travellers.infant
    {
        return Err(AppError::ValidationError(
            "Passengers do not match the travellers that were searched".to_string(),
        ));
    }
    let first = criteria
        .segments
        .first()
        .ok_or_else(|| AppError::ValidationError("Search has no segments".to_string()))?;

    let enquiry_id = Uuid::new_v4();
    let booking = FlightBooking::new(
        NewFlightBooking {
            s_id: req.s_id.clone(),
            user_id: session.user_id,
            enquiry_id: Some(enquiry_id),
            itinerary_ref: itinerary.itinerary_id.clone(),
            origin: first.origin.clone(),
            destination: first.destination.clone(),
            departure_date: first.departure_date,
            cabin_class: criteria.cabin_class,
            currency: itinerary.fare.currency.clone(),
            base_amount: itinerary.fare.base_amount,
            tax_amount: itinerary.fare.tax_amount,
            service_fee: state.business_rules.service_fee_minor,
            contact: req.contact,
            passengers: req.passengers,
        },
        Utc::now(),
    )?;
    state.bookings.create_flight_booking(&booking).await?;

    let product = EnquiryProduct::Flight(FlightRequest {
        segments: criteria.segments.clone(),
        travellers: criteria.travellers,
        cabin_class: criteria.cabin_class,
    });
    open_instant_enquiry(
        &state,
        enquiry_id,
        session.user_id,
        product,
        booking.total_amount,
        &booking.currency,
        booking.reference(),
    )
    .await?;

    info!(
        "Flight booking {} ({}) created for user {}, enquiry {}",
        booking.id, booking.itinerary_ref, session.user_id, enquiry_id
    );
    Ok((StatusCode::CREATED, Json(BookingCreated { booking, enquiry_id })))
}

/// GET /v1/bookings/flights/{id}
async fn get_flight_booking(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<FlightBooking>, AppError> {
    let booking = state
        .bookings
        .get_flight_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Booking {} not found", id)))?;
    if booking.user_id != session.user_id {
        return Err(AppError::AuthorizationError("Booking belongs to another customer".to_string()));
    }
    Ok(Json(booking))
}

// ============================================================================
// Hotels
// ============================================================================

/// POST /v1/bookings/hotels
async fn create_hotel_booking(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<HotelBookingRequest>,
) -> Result<(StatusCode, Json<BookingCreated<HotelBooking>>), AppError> {
    let (criteria, result) = match load_session(&state, &req.s_id).await? {
        SearchSession::Hotel { criteria, result } => (criteria, result),
        SearchSession::Flight { .. } => {
            return Err(AppError::ValidationError(format!("{} is not a hotel search", req.s_id)))
        }
    };
    let (hotel, offer) = result.find_offer(&req.hotel_id, &req.offer_id).ok_or_else(|| {
        AppError::ValidationError(format!(
            "Offer {} of hotel {} is not in search {}",
            req.offer_id, req.hotel_id, req.s_id
        ))
    })?;

    let guest_count = req.guests.len() as u32;
    let enquiry_id = Uuid::new_v4();
    let booking = HotelBooking::new(
        NewHotelBooking {
            s_id: req.s_id.clone(),
            user_id: session.user_id,
            enquiry_id: Some(enquiry_id),
            hotel_id: hotel.hotel_id.clone(),
            hotel_name: hotel.hotel_name.clone(),
            country_code: hotel.country_code.clone(),
            currency: offer.currency.clone(),
            net_price: offer.net_price,
            vat_amount: offer.vat_amount,
            check_in_date: criteria.check_in,
            check_out_date: criteria.check_out,
            number_of_rooms: criteria.rooms.len() as u32,
            package_details: offer.package.clone(),
            guests: req.guests,
        },
        Utc::now(),
    )?;
    state.bookings.create_hotel_booking(&booking).await?;

    let product = EnquiryProduct::Hotel(HotelStayRequest {
        country_code: criteria.country_code.clone(),
        city_code: criteria.city_code.clone(),
        check_in: criteria.check_in,
        check_out: criteria.check_out,
        rooms: criteria.rooms.len() as u32,
        guests: guest_count,
    });
    open_instant_enquiry(
        &state,
        enquiry_id,
        session.user_id,
        product,
        booking.total_amount,
        &booking.currency,
        booking.reference(),
    )
    .await?;

    info!(
        "Hotel booking {} at {} created for user {}, enquiry {}",
        booking.id, booking.hotel_name, session.user_id, enquiry_id
    );
    Ok((StatusCode::CREATED, Json(BookingCreated { booking, enquiry_id })))
}

/// GET /v1/bookings/hotels/{id}
async fn get_hotel_booking(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<HotelBooking>, AppError> {
    let booking = state
        .bookings
        .get_hotel_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Booking {} not found", id)))?;
    if booking.user_id != session.user_id {
        return Err(AppError::AuthorizationError("Booking belongs to another customer".to_string()));
    }
    Ok(Json(booking))
}

/// GET /v1/bookings
async fn list_bookings(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<BookingSummary>>, AppError> {
    Ok(Json(state.bookings.list_bookings(session.user_id).await?))
}
