//! Seeds a development database with a customer, an admin and one submitted
//! holiday enquiry, and prints bearer tokens for both users.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use safar_api::middleware::auth::{issue_token, ROLE_ADMIN, ROLE_CUSTOMER};
use safar_core::events::NoopPublisher;
use safar_core::package::{EnquiryProduct, HolidayPackage};
use safar_core::repository::UserRepository;
use safar_core::search::Travellers;
use safar_core::user::User;
use safar_order::EnquiryManager;
use safar_shared::Masked;
use safar_store::app_config::Config;
use safar_store::{DbClient, PgEnquiryRepository, PgUserRepository};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "Seed demo users and an enquiry")]
struct Args {
    /// Customer e-mail
    #[arg(long, default_value = "customer@safar.test")]
    customer_email: String,

    /// Admin e-mail
    #[arg(long, default_value = "ops@safar.test")]
    admin_email: String,

    /// Skip creating the sample enquiry
    #[arg(long)]
    no_enquiry: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let config = Config::load().context("Failed to load config")?;

    let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;
    let users = PgUserRepository::new(db.pool.clone());

    let customer = User {
        id: Uuid::new_v4(),
        email: Masked::from(args.customer_email.as_str()),
        name: "Demo Customer".to_string(),
        telephone: Some(Masked::from("+96890000000")),
        nationality: Some("OM".to_string()),
        residency: Some("OM".to_string()),
        created_at: Utc::now(),
    };
    let admin = User {
        id: Uuid::new_v4(),
        email: Masked::from(args.admin_email.as_str()),
        name: "Demo Operator".to_string(),
        telephone: None,
        nationality: None,
        residency: None,
        created_at: Utc::now(),
    };
    users.upsert_user(&customer).await?;
    users.upsert_user(&admin).await?;

    if !args.no_enquiry {
        let manager = EnquiryManager::new(
            Arc::new(PgEnquiryRepository::new(db.pool.clone())),
            Arc::new(NoopPublisher),
            config.business_rules.quote_validity_hours,
        );
        let product = EnquiryProduct::Holiday(HolidayPackage {
            package_code: "DXB-4N".to_string(),
            destination: "Dubai".to_string(),
            nights: 4,
            travellers: Travellers { adult: 2, child: 1, infant: 0 },
            inclusions: vec!["flights".to_string(), "hotel".to_string(), "desert safari".to_string()],
        });
        let draft = manager
            .create_draft(customer.id, product, Some("Seeded enquiry".to_string()))
            .await?;
        manager.submit(draft.id, customer.id).await?;
        println!("enquiry   {}", draft.id);
    }

    let ttl = config.auth.jwt_expiration_seconds;
    let secret = &config.auth.jwt_secret;
    println!(
        "customer  {}  {}",
        customer.id,
        issue_token(secret, customer.id, customer.email.expose(), &customer.name, ROLE_CUSTOMER, ttl)?
    );
    println!(
        "admin     {}  {}",
        admin.id,
        issue_token(secret, admin.id, admin.email.expose(), &admin.name, ROLE_ADMIN, ttl)?
    );
    Ok(())
}
