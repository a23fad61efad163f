use chrono::NaiveDate;
use storefront_api::config::AppConfig;
use storefront_api::dto::checkout::ShippingAddressRequest;
use storefront_api::dto::products::CreateProductRequest;
use storefront_api::entity::products::ProductStatus;
use storefront_api::models::format_cents;
use storefront_api::services::report_service::tsv_row;
use uuid::Uuid;

fn test_config(allowed_cities: Vec<String>) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        host: "127.0.0.1".into(),
        port: 3000,
        public_url: "http://localhost:3000".into(),
        admin_email: "admin@example.com".into(),
        allowed_cities,
    }
}

fn shipping_request(city: &str, postal_code: &str) -> ShippingAddressRequest {
    ShippingAddressRequest {
        address: "6000 J St".into(),
        city: city.into(),
        state: "CA".into(),
        country: "US".into(),
        postal_code: postal_code.into(),
    }
}

#[test]
fn product_price_must_be_at_least_one_dollar() {
    let request = CreateProductRequest {
        name: "Widget".into(),
        description: None,
        price_cents: 99,
        stock: 10,
        status: ProductStatus::Active,
    };
    assert!(request.validate().is_err());
}

#[test]
fn product_with_no_stock_cannot_be_active() {
    let request = CreateProductRequest {
        name: "Widget".into(),
        description: None,
        price_cents: 500,
        stock: 0,
        status: ProductStatus::Active,
    };
    assert!(request.validate().is_err());

    let inactive = CreateProductRequest {
        name: "Widget".into(),
        description: None,
        price_cents: 500,
        stock: 0,
        status: ProductStatus::Inactive,
    };
    assert!(inactive.validate().is_ok());
}

#[test]
fn postal_code_must_be_five_digits() {
    let config = test_config(vec![]);
    assert!(shipping_request("Sacramento", "95819").validate(&config).is_ok());
    assert!(shipping_request("Sacramento", "9581").validate(&config).is_err());
    assert!(shipping_request("Sacramento", "9581a").validate(&config).is_err());
}

#[test]
fn city_allow_list_is_case_insensitive_and_optional() {
    let restricted = test_config(vec!["sacramento".into()]);
    assert!(shipping_request("Sacramento", "95819").validate(&restricted).is_ok());
    assert!(shipping_request("Reno", "89501").validate(&restricted).is_err());

    let open = test_config(vec![]);
    assert!(shipping_request("Reno", "89501").validate(&open).is_ok());
}

#[test]
fn canceled_orders_cannot_carry_a_delivery_date() {
    use storefront_api::entity::orders::OrderStatus;
    use storefront_api::services::admin_service::validate_order_edit;

    let date = NaiveDate::from_ymd_opt(2026, 9, 1);
    assert!(validate_order_edit(OrderStatus::Canceled, date).is_err());
    assert!(validate_order_edit(OrderStatus::Canceled, None).is_ok());
    assert!(validate_order_edit(OrderStatus::Shipped, date).is_ok());
}

#[test]
fn conflict_flags_fold_over_every_line() {
    use storefront_api::services::cart_service::{CartLine, cart_total_cents, fold_conflicts};

    let ok_line = CartLine {
        item_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        name: "A".into(),
        quantity: 2,
        original_price_cents: 0,
        price_cents: 500,
        stock: 10,
        status: ProductStatus::Active,
        payment_price_ref: Some("price_a".into()),
    };
    let oversold_line = CartLine {
        item_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        name: "B".into(),
        quantity: 5,
        original_price_cents: 0,
        price_cents: 300,
        stock: 3,
        status: ProductStatus::Active,
        payment_price_ref: Some("price_b".into()),
    };
    let inactive_line = CartLine {
        item_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        name: "C".into(),
        quantity: 1,
        original_price_cents: 0,
        price_cents: 200,
        stock: 10,
        status: ProductStatus::Inactive,
        payment_price_ref: Some("price_c".into()),
    };

    // A conflict on an earlier line is not masked by a clean later line.
    let lines = vec![oversold_line, ok_line, inactive_line];
    let conflicts = fold_conflicts(&lines);
    assert!(conflicts.out_of_stock);
    assert!(conflicts.inactive_product);
    assert!(conflicts.any());

    assert_eq!(cart_total_cents(&lines), 5 * 300 + 2 * 500 + 200);

    let clean = &lines[1..2];
    let none = fold_conflicts(clean);
    assert!(!none.any());
}

#[test]
fn cents_format_as_dollar_amounts() {
    assert_eq!(format_cents(2500), "25.00");
    assert_eq!(format_cents(5), "0.05");
    assert_eq!(format_cents(0), "0.00");
    assert_eq!(format_cents(-199), "-1.99");
}

#[test]
fn tsv_rows_squash_embedded_separators() {
    let row = tsv_row(&[
        "a\tb".to_string(),
        "line\nbreak".to_string(),
        "plain".to_string(),
    ]);
    assert_eq!(row, "a b\tline break\tplain\n");
}
