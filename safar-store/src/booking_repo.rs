use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use safar_core::booking::{
    Address, BookingKind, BookingRef, BookingStatus, BookingSummary, ContactDetails, FlightBooking, Guest, GuestType, HotelBooking,
    PackageDetails, Passenger, PassengerType, TicketInfo, TravelDocument,
};
use safar_core::repository::BookingRepository;
use safar_core::search::CabinClass;
use safar_core::{CoreError, CoreResult};
use safar_shared::Masked;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::database::{storage_error, to_i32, to_u32};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn corrupt(what: &str, value: &str) -> CoreError {
    CoreError::StorageError(format!("unexpected {} '{}' in storage", what, value))
}

fn parse_status(value: &str) -> CoreResult<BookingStatus> {
    BookingStatus::parse(value).ok_or_else(|| corrupt("booking status", value))
}

#[derive(sqlx::FromRow)]
struct FlightBookingRow {
    id: Uuid,
    s_id: String,
    user_id: Uuid,
    enquiry_id: Option<Uuid>,
    currency: String,
    base_amount: i64,
    tax_amount: i64,
    service_fee: i64,
    total_amount: i64,
    booking_status: String,
    itinerary_ref: String,
    origin: String,
    destination: String,
    departure_date: NaiveDate,
    cabin_class: String,
    contact_email: String,
    contact_telephone: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FlightBookingRow {
    fn into_booking(self, passengers: Vec<Passenger>) -> CoreResult<FlightBooking> {
        Ok(FlightBooking {
            id: self.id,
            s_id: self.s_id,
            user_id: self.user_id,
            enquiry_id: self.enquiry_id,
            currency: self.currency,
            base_amount: self.base_amount,
            tax_amount: self.tax_amount,
            service_fee: self.service_fee,
            total_amount: self.total_amount,
            booking_status: parse_status(&self.booking_status)?,
            itinerary_ref: self.itinerary_ref,
            origin: self.origin,
            destination: self.destination,
            departure_date: self.departure_date,
            cabin_class: CabinClass::parse(&self.cabin_class)
                .ok_or_else(|| corrupt("cabin class", &self.cabin_class))?,
            contact: ContactDetails {
                email: Masked::new(self.contact_email),
                telephone: Masked::new(self.contact_telephone),
            },
            passengers,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    passenger_index: i32,
    passenger_type: String,
    title: Option<String>,
    first_name: String,
    last_name: String,
    date_of_birth: NaiveDate,
    nationality: String,
    document: Json<TravelDocument>,
    e_ticket_number: Option<String>,
    pnr: Option<String>,
    ticket_status: Option<String>,
}

impl TryFrom<PassengerRow> for Passenger {
    type Error = CoreError;

    fn try_from(row: PassengerRow) -> CoreResult<Self> {
        Ok(Passenger {
            passenger_index: to_u32(row.passenger_index, "passenger_index")?,
            passenger_type: PassengerType::parse(&row.passenger_type)
                .ok_or_else(|| corrupt("passenger type", &row.passenger_type))?,
            title: row.title,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            nationality: row.nationality,
            document: row.document.0,
            ticket: TicketInfo {
                e_ticket_number: row.e_ticket_number,
                pnr: row.pnr,
                ticket_status: row.ticket_status,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct HotelBookingRow {
    id: Uuid,
    s_id: String,
    user_id: Uuid,
    enquiry_id: Option<Uuid>,
    hotel_id: String,
    hotel_name: String,
    country_code: String,
    booking_reference: Option<String>,
    currency: String,
    net_price: i64,
    vat_amount: i64,
    total_amount: i64,
    check_in_date: NaiveDate,
    check_out_date: NaiveDate,
    number_of_nights: i32,
    number_of_rooms: i32,
    package_details: Json<PackageDetails>,
    booking_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl HotelBookingRow {
    fn into_booking(self, guests: Vec<Guest>) -> CoreResult<HotelBooking> {
        Ok(HotelBooking {
            id: self.id,
            s_id: self.s_id,
            user_id: self.user_id,
            enquiry_id: self.enquiry_id,
            hotel_id: self.hotel_id,
            hotel_name: self.hotel_name,
            country_code: self.country_code,
            booking_reference: self.booking_reference,
            currency: self.currency,
            net_price: self.net_price,
            vat_amount: self.vat_amount,
            total_amount: self.total_amount,
            check_in_date: self.check_in_date,
            check_out_date: self.check_out_date,
            number_of_nights: i64::from(self.number_of_nights),
            number_of_rooms: to_u32(self.number_of_rooms, "number_of_rooms")?,
            package_details: self.package_details.0,
            guests,
            booking_status: parse_status(&self.booking_status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GuestRow {
    pax_id: i32,
    room_id: i32,
    is_lead_guest: bool,
    guest_type: String,
    title: Option<String>,
    first_name: String,
    last_name: String,
    age: Option<i32>,
    address: Json<Address>,
}

impl TryFrom<GuestRow> for Guest {
    type Error = CoreError;

    fn try_from(row: GuestRow) -> CoreResult<Self> {
        let guest_type = match row.guest_type.as_str() {
            "ADULT" => GuestType::Adult,
            "CHILD" => GuestType::Child,
            other => return Err(corrupt("guest type", other)),
        };
        Ok(Guest {
            pax_id: to_u32(row.pax_id, "pax_id")?,
            room_id: to_u32(row.room_id, "room_id")?,
            is_lead_guest: row.is_lead_guest,
            guest_type,
            title: row.title,
            first_name: row.first_name,
            last_name: row.last_name,
            age: row.age.map(|a| to_u32(a, "age")).transpose()?,
            address: row.address.0,
        })
    }
}

fn guest_type_code(guest_type: GuestType) -> &'static str {
    match guest_type {
        GuestType::Adult => "ADULT",
        GuestType::Child => "CHILD",
    }
}

const FLIGHT_COLUMNS: &str = "id, s_id, user_id, enquiry_id, currency, base_amount, tax_amount, service_fee, \
     total_amount, booking_status, itinerary_ref, origin, destination, departure_date, cabin_class, \
     contact_email, contact_telephone, created_at, updated_at";

const HOTEL_COLUMNS: &str = "id, s_id, user_id, enquiry_id, hotel_id, hotel_name, country_code, booking_reference, \
     currency, net_price, vat_amount, total_amount, check_in_date, check_out_date, number_of_nights, \
     number_of_rooms, package_details, booking_status, created_at, updated_at";

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_flight_booking(&self, booking: &FlightBooking) -> CoreResult<()> {
        booking.validate()?;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO flight_bookings (
                id, s_id, user_id, enquiry_id, currency, base_amount, tax_amount, service_fee,
                total_amount, booking_status, itinerary_ref, origin, destination, departure_date,
                cabin_class, contact_email, contact_telephone, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.s_id)
        .bind(booking.user_id)
        .bind(booking.enquiry_id)
        .bind(&booking.currency)
        .bind(booking.base_amount)
        .bind(booking.tax_amount)
        .bind(booking.service_fee)
        .bind(booking.total_amount)
        .bind(booking.booking_status.as_str())
        .bind(&booking.itinerary_ref)
        .bind(&booking.origin)
        .bind(&booking.destination)
        .bind(booking.departure_date)
        .bind(booking.cabin_class.as_str())
        .bind(booking.contact.email.expose())
        .bind(booking.contact.telephone.expose())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for p in &booking.passengers {
            sqlx::query(
                r#"
                INSERT INTO passengers (
                    booking_id, passenger_index, passenger_type, title, first_name, last_name,
                    date_of_birth, nationality, document, e_ticket_number, pnr, ticket_status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(booking.id)
            .bind(to_i32(p.passenger_index, "passengerIndex")?)
            .bind(p.passenger_type.code())
            .bind(p.title.as_deref())
            .bind(&p.first_name)
            .bind(&p.last_name)
            .bind(p.date_of_birth)
            .bind(&p.nationality)
            .bind(Json(&p.document))
            .bind(p.ticket.e_ticket_number.as_deref())
            .bind(p.ticket.pnr.as_deref())
            .bind(p.ticket.ticket_status.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        info!(
            "Stored flight booking {} ({} passengers)",
            booking.id,
            booking.passengers.len()
        );
        Ok(())
    }

    async fn get_flight_booking(&self, id: Uuid) -> CoreResult<Option<FlightBooking>> {
        let row: Option<FlightBookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM flight_bookings WHERE id = $1", FLIGHT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let passenger_rows: Vec<PassengerRow> = sqlx::query_as(
            r#"
            SELECT passenger_index, passenger_type, title, first_name, last_name, date_of_birth,
                   nationality, document, e_ticket_number, pnr, ticket_status
            FROM passengers WHERE booking_id = $1 ORDER BY passenger_index
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let passengers = passenger_rows
            .into_iter()
            .map(Passenger::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        row.into_booking(passengers).map(Some)
    }

    async fn create_hotel_booking(&self, booking: &HotelBooking) -> CoreResult<()> {
        booking.validate()?;
        let nights = i32::try_from(booking.number_of_nights)
            .map_err(|_| CoreError::ValidationError("numberOfNights is out of range".to_string()))?;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO hotel_bookings (
                id, s_id, user_id, enquiry_id, hotel_id, hotel_name, country_code, booking_reference,
                currency, net_price, vat_amount, total_amount, check_in_date, check_out_date,
                number_of_nights, number_of_rooms, package_details, booking_status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.s_id)
        .bind(booking.user_id)
        .bind(booking.enquiry_id)
        .bind(&booking.hotel_id)
        .bind(&booking.hotel_name)
        .bind(&booking.country_code)
        .bind(booking.booking_reference.as_deref())
        .bind(&booking.currency)
        .bind(booking.net_price)
        .bind(booking.vat_amount)
        .bind(booking.total_amount)
        .bind(booking.check_in_date)
        .bind(booking.check_out_date)
        .bind(nights)
        .bind(to_i32(booking.number_of_rooms, "numberOfRooms")?)
        .bind(Json(&booking.package_details))
        .bind(booking.booking_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for g in &booking.guests {
            sqlx::query(
                r#"
                INSERT INTO guests (
                    booking_id, pax_id, room_id, is_lead_guest, guest_type, title,
                    first_name, last_name, age, address
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(booking.id)
            .bind(to_i32(g.pax_id, "paxId")?)
            .bind(to_i32(g.room_id, "roomId")?)
            .bind(g.is_lead_guest)
            .bind(guest_type_code(g.guest_type))
            .bind(g.title.as_deref())
            .bind(&g.first_name)
            .bind(&g.last_name)
            .bind(g.age.map(|a| to_i32(a, "age")).transpose()?)
            .bind(Json(&g.address))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        info!("Stored hotel booking {} ({} guests)", booking.id, booking.guests.len());
        Ok(())
    }

    async fn get_hotel_booking(&self, id: Uuid) -> CoreResult<Option<HotelBooking>> {
        let row: Option<HotelBookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM hotel_bookings WHERE id = $1", HOTEL_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let guest_rows: Vec<GuestRow> = sqlx::query_as(
            r#"
            SELECT pax_id, room_id, is_lead_guest, guest_type, title, first_name, last_name, age, address
            FROM guests WHERE booking_id = $1 ORDER BY pax_id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let guests = guest_rows
            .into_iter()
            .map(Guest::try_from)
            .collect::<CoreResult<Vec<_>>>()?;
        row.into_booking(guests).map(Some)
    }

    async fn list_bookings(&self, user_id: Uuid) -> CoreResult<Vec<BookingSummary>> {
        let flights: Vec<FlightBookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM flight_bookings WHERE user_id = $1", FLIGHT_COLUMNS))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;
        let hotels: Vec<HotelBookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM hotel_bookings WHERE user_id = $1", HOTEL_COLUMNS))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;

        // Summaries never show people, so the child tables are not read.
        let mut summaries = Vec::with_capacity(flights.len() + hotels.len());
        for row in flights {
            summaries.push(BookingSummary::from(&row.into_booking(Vec::new())?));
        }
        for row in hotels {
            summaries.push(BookingSummary::from(&row.into_booking(Vec::new())?));
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn discard_booking(&self, booking: BookingRef) -> CoreResult<()> {
        // Passengers and guests go with the row (ON DELETE CASCADE).
        let table = match booking.kind {
            BookingKind::Flight => "flight_bookings",
            BookingKind::Hotel => "hotel_bookings",
        };
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", table))
            .bind(booking.id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        info!("Discarded {} booking {}", booking.kind.as_str(), booking.id);
        Ok(())
    }
}
