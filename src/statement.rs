use std::collections::HashMap;

use crate::models::{Client, Order, OrderItem, Payment};

pub const BUSINESS_NAME: &str = "Kayzonale Prints and Designs";

/// Markdown statement of an order: line items, payments and what is still owed
pub struct OrderStatement<'a> {
    pub order: &'a Order,
    pub client: Option<&'a Client>,
    pub items: &'a [OrderItem],
    pub payments: &'a [Payment],
    /// Product titles by id, for item descriptions
    pub product_titles: HashMap<i32, String>,
}

impl OrderStatement<'_> {
    pub fn file_name(&self) -> String {
        format!("order_{}_statement.md", self.order.order_id)
    }

    pub fn to_markdown(&self) -> String {
        let mut content = String::new();
        let order = self.order;

        content.push_str(&format!("# {BUSINESS_NAME}\n\n"));
        content.push_str(&format!("## Statement for order #{}\n\n", order.order_id));
        content.push_str(&format!("Placed on {}  \n", order.created_at.format("%d/%m/%Y")));
        content.push_str(&format!("Status: **{}**\n\n", order.status));

        if let Some(client) = self.client {
            content.push_str("**Billed to**  \n");
            if let Some(company) = client.company_name.as_deref().filter(|c| !c.is_empty()) {
                content.push_str(&format!("{company}  \n"));
            }
            content.push_str(&format!("{}  \n", client.full_name()));
            content.push_str(&format!("{}  \n", client.contact));
            if let Some(email) = &client.email {
                content.push_str(&format!("{email}  \n"));
            }
            if let Some(address) = &client.address {
                content.push_str(&format!("{address}  \n"));
            }
            content.push('\n');
        }

        if let Some(notes) = order.notes.as_deref().filter(|n| !n.is_empty()) {
            content.push_str(&format!("> {notes}\n\n"));
        }

        if !self.items.is_empty() {
            content.push_str("| Item | Qty | Unit price | Total |\n");
            content.push_str("|:-----|----:|-----------:|------:|\n");
            for item in self.items {
                let title = self
                    .product_titles
                    .get(&item.product_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Product #{}", item.product_id));
                content.push_str(&format!(
                    "| {} | {} | {:.2} | {:.2} |\n",
                    title,
                    item.quantity,
                    item.price,
                    item.line_total()
                ));
            }
            content.push('\n');
        }

        if !self.payments.is_empty() {
            content.push_str("### Payments\n\n");
            content.push_str("| Date | Method | Reference | Amount |\n");
            content.push_str("|:-----|:-------|:----------|-------:|\n");
            for payment in self.payments {
                content.push_str(&format!(
                    "| {} | {} | {} | {:.2} |\n",
                    payment.paid_at.format("%d/%m/%Y"),
                    payment.method,
                    payment.reference.as_deref().unwrap_or("-"),
                    payment.amount
                ));
            }
            content.push('\n');
        }

        let balance = order.balance();
        content.push_str("| | |\n|:--|--:|\n");
        content.push_str(&format!("| Total | {:.2} |\n", balance.total_amount));
        content.push_str(&format!("| Paid | {:.2} |\n", balance.total_paid));
        content.push_str(&format!("| **Balance due** | **{:.2}** |\n", balance.balance_due()));

        content
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn timestamp() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    #[test]
    fn renders_items_payments_and_balance() {
        let order = Order {
            order_id: 12,
            client_id: 3,
            project_id: None,
            user_id: 1,
            status: "Pending".to_string(),
            total_amount: 250.0,
            total_paid: 100.0,
            balance_due: 150.0,
            notes: Some("Deliver to shop".to_string()),
            created_at: timestamp(),
            updated_at: None,
        };
        let client = Client {
            client_id: 3,
            user_id: None,
            company_name: Some("Adinkra Ltd".to_string()),
            first_name: "Esi".to_string(),
            last_name: "Owusu".to_string(),
            email: None,
            contact: "0551234567".to_string(),
            address: None,
            created_at: timestamp(),
            updated_at: None,
        };
        let items = vec![OrderItem {
            id: 1,
            order_id: 12,
            product_id: 5,
            quantity: 50,
            price: 5.0,
        }];
        let payments = vec![Payment {
            payment_id: 9,
            order_id: 12,
            amount: 100.0,
            method: "Mobile Money".to_string(),
            reference: None,
            paid_at: timestamp(),
        }];

        let statement = OrderStatement {
            order: &order,
            client: Some(&client),
            items: &items,
            payments: &payments,
            product_titles: HashMap::from([(5, "Business cards".to_string())]),
        };
        let markdown = statement.to_markdown();

        assert_eq!(statement.file_name(), "order_12_statement.md");
        assert!(markdown.contains("## Statement for order #12"));
        assert!(markdown.contains("Adinkra Ltd"));
        assert!(markdown.contains("Esi Owusu"));
        assert!(markdown.contains("| Business cards | 50 | 5.00 | 250.00 |"));
        assert!(markdown.contains("| 09/03/2024 | Mobile Money | - | 100.00 |"));
        assert!(markdown.contains("| **Balance due** | **150.00** |"));
    }
}
