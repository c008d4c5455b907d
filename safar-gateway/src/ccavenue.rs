use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use md5::{Digest, Md5};
use safar_core::money::{format_minor, parse_minor};
use safar_core::payment::{GatewayCallback, GatewayOrderStatus, PaymentGateway, PaymentRequest, PaymentSession};
use safar_core::supplier::GatewayError;
use safar_shared::Masked;
use std::collections::HashMap;
use tracing::{info, warn};
use url::form_urlencoded;
use uuid::Uuid;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Fixed IV mandated by the gateway's integration kit.
const IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

const INITIATE_PATH: &str = "/transaction/transaction.do?command=initiateTransaction";

fn derive_key(working_key: &str) -> [u8; 16] {
    let digest = Md5::digest(working_key.as_bytes());
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest);
    key
}

/// AES-128-CBC / PKCS7, key = MD5(working key), hex output.
pub fn encrypt(working_key: &str, plaintext: &str) -> String {
    let key = derive_key(working_key);
    let ciphertext = Aes128CbcEnc::new(&key.into(), &IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    hex::encode(ciphertext)
}

pub fn decrypt(working_key: &str, hex_ciphertext: &str) -> Result<String, GatewayError> {
    let bytes = hex::decode(hex_ciphertext.trim())
        .map_err(|e| GatewayError::Crypto(format!("response is not hex: {}", e)))?;
    let key = derive_key(working_key);
    let plaintext = Aes128CbcDec::new(&key.into(), &IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
        .map_err(|_| GatewayError::Crypto("response does not decrypt with the working key".to_string()))?;
    String::from_utf8(plaintext).map_err(|e| GatewayError::Crypto(e.to_string()))
}

/// CCAvenue hosted-checkout integration.
///
/// The transaction payload is encrypted here, on the server; the browser only
/// ever sees the opaque `encRequest` and the public access code.
pub struct CcAvenueGateway {
    merchant_id: String,
    access_code: String,
    working_key: Masked<String>,
    gateway_base_url: String,
    redirect_url: String,
    cancel_url: String,
}

impl CcAvenueGateway {
    pub fn new(
        merchant_id: &str,
        access_code: &str,
        working_key: &str,
        gateway_base_url: &str,
        redirect_url: &str,
        cancel_url: &str,
    ) -> Result<Self, GatewayError> {
        for (name, value) in [
            ("merchant_id", merchant_id),
            ("access_code", access_code),
            ("working_key", working_key),
            ("gateway_base_url", gateway_base_url),
            ("redirect_url", redirect_url),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::Config(format!("ccavenue {} is empty", name)));
            }
        }

        Ok(Self {
            merchant_id: merchant_id.to_string(),
            access_code: access_code.to_string(),
            working_key: Masked::new(working_key.to_string()),
            gateway_base_url: gateway_base_url.trim_end_matches('/').to_string(),
            redirect_url: redirect_url.to_string(),
            cancel_url: if cancel_url.trim().is_empty() {
                redirect_url.to_string()
            } else {
                cancel_url.to_string()
            },
        })
    }

    pub fn transaction_url(&self) -> String {
        format!("{}{}", self.gateway_base_url, INITIATE_PATH)
    }

    fn payload(&self, request: &PaymentRequest) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("merchant_id", &self.merchant_id)
            .append_pair("order_id", &request.enquiry_id.to_string())
            .append_pair("currency", &request.currency)
            .append_pair("amount", &format_minor(request.amount))
            .append_pair("redirect_url", &self.redirect_url)
            .append_pair("cancel_url", &self.cancel_url)
            .append_pair("language", "EN")
            .append_pair("billing_name", &request.customer_name)
            .append_pair("billing_email", request.customer_email.expose())
            .append_pair("merchant_param1", &request.payment_id.to_string())
            .finish()
    }
}

fn non_empty(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != "null")
        .map(str::to_string)
}

#[async_trait]
impl PaymentGateway for CcAvenueGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        let enc_request = encrypt(self.working_key.expose(), &self.payload(request));
        info!(
            "Prepared CCAvenue hand-off for enquiry {} (payment {}, {} {})",
            request.enquiry_id,
            request.payment_id,
            format_minor(request.amount),
            request.currency
        );

        Ok(PaymentSession {
            enc_request,
            access_code: self.access_code.clone(),
            gateway_url: self.transaction_url(),
            enquiry_id: request.enquiry_id,
        })
    }

    fn decode_callback(&self, enc_response: &str) -> Result<GatewayCallback, GatewayError> {
        let plaintext = decrypt(self.working_key.expose(), enc_response)?;
        let fields: HashMap<String, String> = form_urlencoded::parse(plaintext.as_bytes())
            .into_owned()
            .collect();

        let order_id = non_empty(&fields, "order_id")
            .ok_or_else(|| GatewayError::Decode("callback has no order_id".to_string()))?;
        let order_status = non_empty(&fields, "order_status")
            .map(|s| GatewayOrderStatus::from_gateway(&s))
            .ok_or_else(|| GatewayError::Decode("callback has no order_status".to_string()))?;

        let amount = match non_empty(&fields, "amount") {
            Some(raw) => Some(
                parse_minor(&raw)
                    .ok_or_else(|| GatewayError::Decode(format!("callback amount '{}' is not a number", raw)))?,
            ),
            None => None,
        };

        let payment_ref = non_empty(&fields, "merchant_param1").and_then(|raw| {
            Uuid::parse_str(&raw)
                .map_err(|_| warn!("Ignoring non-uuid merchant_param1 '{}'", raw))
                .ok()
        });

        Ok(GatewayCallback {
            order_id,
            payment_ref,
            tracking_id: non_empty(&fields, "tracking_id"),
            bank_ref_no: non_empty(&fields, "bank_ref_no"),
            order_status,
            failure_message: non_empty(&fields, "failure_message")
                .or_else(|| non_empty(&fields, "status_message")),
            amount,
            currency: non_empty(&fields, "currency"),
        })
    }

    fn name(&self) -> &'static str {
        "ccavenue"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKING_KEY: &str = "0123456789ABCDEF0123456789ABCDEF";

    fn gateway() -> CcAvenueGateway {
        CcAvenueGateway::new(
            "45990",
            "AVXX00KL12AB34CDBA",
            WORKING_KEY,
            "https://secure.ccavenue.ae/",
            "https://api.safar.travel/v1/webhooks/payments/ccavenue",
            "",
        )
        .unwrap()
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            payment_id: Uuid::new_v4(),
            enquiry_id: Uuid::new_v4(),
            amount: 100_250,
            currency: "SAR".to_string(),
            customer_name: "Faisal Alharbi".to_string(),
            customer_email: "faisal@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_initiate_builds_encrypted_handoff() {
        let gateway = gateway();
        let request = request();
        let session = gateway.initiate(&request).await.unwrap();

        assert!(session.is_complete());
        assert_eq!(session.access_code, "AVXX00KL12AB34CDBA");
        assert_eq!(
            session.gateway_url,
            "https://secure.ccavenue.ae/transaction/transaction.do?command=initiateTransaction"
        );
        assert!(!session.enc_request.contains("merchant_id"));

        let plain = decrypt(WORKING_KEY, &session.enc_request).unwrap();
        let fields: HashMap<String, String> = form_urlencoded::parse(plain.as_bytes()).into_owned().collect();
        assert_eq!(fields["order_id"], request.enquiry_id.to_string());
        assert_eq!(fields["amount"], "1002.50");
        assert_eq!(fields["merchant_param1"], request.payment_id.to_string());
        assert_eq!(fields["cancel_url"], fields["redirect_url"]);
    }

    #[test]
    fn test_decode_success_callback() {
        let gateway = gateway();
        let enquiry_id = Uuid::new_v4();
        let payment_id = Uuid::new_v4();
        let response = format!(
            "order_id={}&tracking_id=310009876543&bank_ref_no=BRN77&order_status=Success&failure_message=&amount=1002.50&currency=SAR&merchant_param1={}",
            enquiry_id, payment_id
        );
        let callback = gateway
            .decode_callback(&encrypt(WORKING_KEY, &response))
            .unwrap();

        assert_eq!(callback.enquiry_id().unwrap(), enquiry_id);
        assert_eq!(callback.payment_ref, Some(payment_id));
        assert!(callback.order_status.is_success());
        assert_eq!(callback.amount, Some(100_250));
        assert_eq!(callback.tracking_id.as_deref(), Some("310009876543"));
        assert_eq!(callback.failure_message, None);
    }

    #[test]
    fn test_decode_failure_uses_status_message() {
        let response = "order_id=abc&order_status=Failure&status_message=Card%20declined";
        let callback = gateway()
            .decode_callback(&encrypt(WORKING_KEY, response))
            .unwrap();
        assert_eq!(callback.order_status, GatewayOrderStatus::Failure);
        assert_eq!(callback.failure_message.as_deref(), Some("Card declined"));
        assert!(callback.enquiry_id().is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let gateway = gateway();
        assert!(matches!(
            gateway.decode_callback("not-hex"),
            Err(GatewayError::Crypto(_))
        ));
        // 15 bytes is not a whole AES block
        assert!(matches!(
            gateway.decode_callback(&"ab".repeat(15)),
            Err(GatewayError::Crypto(_))
        ));
        assert!(matches!(
            gateway.decode_callback(&encrypt(WORKING_KEY, "order_status=Success")),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_credentials_are_rejected() {
        assert!(CcAvenueGateway::new("", "AV", "key", "https://x", "https://y", "").is_err());
    }
}
