//! Remote (server-side) receipt validation: posts the receipt to
//! `receipt_validation.server_url` and maps its documented status codes.

use serde::{Deserialize, Serialize};

use crate::config::ReceiptValidationConfig;
use crate::error::IapError;
use crate::types::{Order, ReceiptEnvironment, Transaction, TransactionState, ValidationResult};

#[derive(Serialize)]
struct OrderInfo<'a> {
    order_id: uuid::Uuid,
    product_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_order_id: Option<&'a str>,
}

#[derive(Serialize)]
struct ValidateReceiptRequest<'a> {
    receipt_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shared_secret: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_info: Option<OrderInfo<'a>>,
}

#[derive(Deserialize)]
struct ValidateReceiptResponse {
    status: i64,
    receipt: Option<ReceiptPayload>,
    order_validation: Option<OrderValidationPayload>,
}

#[derive(Deserialize)]
struct OrderValidationPayload {
    server_order_id: Option<String>,
}

#[derive(Deserialize)]
struct ReceiptPayload {
    creation_date: chrono::DateTime<chrono::Utc>,
    application_version: Option<String>,
    original_application_version: Option<String>,
    environment: Option<String>,
    #[serde(default)]
    in_app: Vec<InAppPayload>,
}

#[derive(Deserialize)]
struct InAppPayload {
    transaction_id: String,
    product_id: String,
    purchase_date: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    original_transaction_id: Option<String>,
    #[serde(default = "crate::types::default_quantity")]
    quantity: u32,
}

/// Posts `receipt_data` to the configured validation server and translates
/// the documented status codes into [`ValidationResult`]/[`IapError`].
///
/// Status 0 is success. 21002 and 21003 indicate malformed or unreadable
/// receipt data. 21004 and 21005 indicate a shared-secret or server
/// misconfiguration. 21007 means the receipt was issued by the sandbox
/// environment; this core does not re-route to a sandbox endpoint, it marks
/// the result invalid with the environment recorded as `Sandbox`. 21008
/// means the receipt is a production receipt sent to the wrong environment.
/// Any other non-zero status is an opaque server-side validation failure. An
/// `order_validation.server_order_id` that disagrees with the bound order's
/// own `server_order_id` fails the call with `ServerOrderMismatch`, ahead of
/// parsing the receipt body.
pub async fn validate_remote(
    http: &reqwest::Client,
    receipt_data: &[u8],
    order: Option<&Order>,
    config: &ReceiptValidationConfig,
) -> Result<ValidationResult, IapError> {
    let server_url = config
        .server_url
        .as_deref()
        .ok_or_else(|| IapError::ConfigurationError("remote validation requires server_url".into()))?;

    let request = ValidateReceiptRequest {
        receipt_data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, receipt_data),
        shared_secret: config.shared_secret.as_deref(),
        order_info: order.map(|o| OrderInfo {
            order_id: o.id,
            product_id: &o.product_id,
            server_order_id: o.server_order_id.as_deref(),
        }),
    };

    let response = http
        .post(server_url)
        .json(&request)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(IapError::ServerValidationFailed(response.status().as_u16() as i64));
    }

    let body: ValidateReceiptResponse = response.json().await?;

    match body.status {
        0 => {}
        21002 | 21003 => return Err(IapError::InvalidReceiptData),
        21004 | 21005 => {
            return Err(IapError::ConfigurationError(format!(
                "receipt validation server rejected request configuration (status {})",
                body.status
            )))
        }
        21007 => {
            return Ok(ValidationResult {
                is_valid: false,
                error: Some("receipt is from the sandbox environment".into()),
                environment: Some(ReceiptEnvironment::Sandbox),
                ..Default::default()
            })
        }
        21008 => {
            return Ok(ValidationResult {
                is_valid: false,
                error: Some("production receipt sent to sandbox validation endpoint".into()),
                environment: Some(ReceiptEnvironment::Production),
                ..Default::default()
            })
        }
        other => return Err(IapError::ServerValidationFailed(other)),
    }

    if let (Some(order), Some(validation)) = (order, &body.order_validation) {
        if let (Some(reported), Some(expected)) = (&validation.server_order_id, &order.server_order_id) {
            if reported != expected {
                return Err(IapError::ServerOrderMismatch);
            }
        }
    }

    let receipt = body
        .receipt
        .ok_or_else(|| IapError::ReceiptValidationFailed("validation server reported success with no receipt payload".into()))?;

    let environment = match receipt.environment.as_deref() {
        Some("Sandbox") => Some(ReceiptEnvironment::Sandbox),
        Some("Production") => Some(ReceiptEnvironment::Production),
        _ => None,
    };

    let transactions = receipt
        .in_app
        .into_iter()
        .map(|tx| Transaction {
            id: tx.transaction_id,
            product_id: tx.product_id,
            purchase_date: tx.purchase_date,
            state: TransactionState::Purchased,
            receipt_data: None,
            original_transaction_id: tx.original_transaction_id,
            quantity: tx.quantity,
            app_account_token: None,
        })
        .collect();

    Ok(ValidationResult {
        is_valid: true,
        transactions,
        error: None,
        receipt_creation_date: Some(receipt.creation_date),
        app_version: receipt.application_version,
        original_app_version: receipt.original_application_version,
        environment,
    })
}
