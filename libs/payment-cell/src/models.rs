use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    CreditCard,
    DebitCard,
    Pix,
}

impl PaymentMethodKind {
    pub fn is_card(&self) -> bool {
        matches!(self, PaymentMethodKind::CreditCard | PaymentMethodKind::DebitCard)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CardData {
    pub number: String,
    pub holder_name: String,
    pub expiry: String,
    pub cvv: String,
}

// Card numbers and CVVs must never reach the logs.
impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_four: String = self
            .number
            .chars()
            .filter(char::is_ascii_digit)
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        f.debug_struct("CardData")
            .field("number", &format!("**** {}", last_four))
            .field("holder_name", &self.holder_name)
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessPaymentRequest {
    pub payment_method: PaymentMethodKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_data: Option<CardData>,
}

impl ProcessPaymentRequest {
    /// Card details are only sent along with card methods.
    pub fn new(payment_method: PaymentMethodKind, card_data: Option<CardData>) -> Self {
        Self {
            payment_method,
            card_data: card_data.filter(|_| payment_method.is_card()),
        }
    }
}
