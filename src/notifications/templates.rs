use serde::Serialize;

use super::OrderSummary;

/// Sender identity and links shared by every transactional email
#[derive(Debug, Clone)]
pub struct MailIdentity {
    pub store_name: String,
    pub from_address: String,
    pub frontend_url: String,
}

impl MailIdentity {
    /// `"Store Name" <address>`
    pub fn from_header(&self) -> String {
        format!("\"{}\" <{}>", self.store_name.replace('"', ""), self.from_address)
    }
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub const CANCELLATION_SUBJECT: &str = "Your Order Has Been Cancelled";
pub const VERIFICATION_SUBJECT: &str = "Email Verification OTP";
pub const OTP_VALIDITY_MINUTES: u32 = 10;

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Short customer-facing reference: last six characters of the id, upper-cased.
pub fn order_reference(summary: &OrderSummary) -> String {
    let simple = summary.id.simple().to_string();
    simple[simple.len() - 6..].to_uppercase()
}

pub fn render_verification(identity: &MailIdentity, to: &str, name: &str, otp: &str) -> EmailMessage {
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2>Verify Your Email</h2>
  <p>Hello {name},</p>
  <p>Please use the following one-time password to verify your email address:</p>
  <div style="font-size: 24px; font-weight: bold; letter-spacing: 5px; text-align: center;">{otp}</div>
  <p>This OTP is valid for {minutes} minutes. If you didn't request this, please ignore this email.</p>
  <p style="font-size: 13px; color: #888;">This is an automated email. Please do not reply to this message.</p>
</div>"#,
        name = escape_html(name),
        otp = escape_html(otp),
        minutes = OTP_VALIDITY_MINUTES,
    );

    EmailMessage {
        from: identity.from_header(),
        to: to.to_string(),
        subject: VERIFICATION_SUBJECT.to_string(),
        html,
    }
}

pub fn render_cancellation(
    identity: &MailIdentity,
    to: &str,
    name: &str,
    summary: &OrderSummary,
) -> EmailMessage {
    let reference = order_reference(summary);
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="text-align: center;">
    <h2>Order Cancelled</h2>
    <p style="color: #777;">Order #{reference}</p>
  </div>
  <p>Hello {name},</p>
  <p>We're writing to confirm that your order has been cancelled as requested. Here's a summary of the cancelled order:</p>
  <table style="width: 100%;">
    <tr><td>Order ID:</td><td style="text-align: right;">#{reference}</td></tr>
    <tr><td>Order Date:</td><td style="text-align: right;">{date}</td></tr>
    <tr><td>Items:</td><td style="text-align: right;">{items}</td></tr>
    <tr><td>Total Amount:</td><td style="text-align: right; font-weight: bold;">₹{amount}</td></tr>
  </table>
  <p>If you've been charged for this order, a refund will be processed according to our refund policy. It may take 5-7 business days for the refund to appear in your account.</p>
  <div style="text-align: center;">
    <a href="{frontend}" style="background-color: #4a69bd; color: white; padding: 10px 20px;">Continue Shopping</a>
  </div>
  <p style="font-size: 13px; color: #777; text-align: center;">Thank you for shopping with {store}!</p>
</div>"#,
        reference = reference,
        name = escape_html(name),
        date = summary.date.format("%d %b %Y"),
        items = summary.item_count,
        amount = format!("{:.2}", summary.amount),
        frontend = escape_html(&identity.frontend_url),
        store = escape_html(&identity.store_name),
    );

    EmailMessage {
        from: identity.from_header(),
        to: to.to_string(),
        subject: CANCELLATION_SUBJECT.to_string(),
        html,
    }
}
