use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth as auth_dto,
        cart::{AddToCartRequest, CartConflicts, CartItemDto, CartLineView, CartView,
            UpdateCartItemRequest},
        checkout::{CheckoutSessionResponse, ShippingAddressRequest, ShippingAddressView},
        orders::{OrderLineView, OrderList, OrderView},
        products as product_dto,
        reports::{MonthlyOrdersReport, StatusCountReport, TopSellingEntry, TopSellingReport},
    },
    models::{Cart, CartStatus, Order, OrderStatus, Product, ProductStatus, ShippingAddress, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, checkout, health, orders, params, products as product_routes},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        auth::delete_account,
        cart::view_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        checkout::set_shipping_address,
        checkout::create_payment_session,
        checkout::confirm,
        checkout::payment_cancel,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        orders::list_orders,
        orders::get_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order,
        admin::list_low_stock,
        admin::list_stock_overflow,
        admin::adjust_inventory,
        admin::top_selling,
        admin::orders_per_month,
        admin::status_counts,
        admin::export_orders
    ),
    components(
        schemas(
            User,
            Product,
            ProductStatus,
            Cart,
            CartStatus,
            ShippingAddress,
            Order,
            OrderStatus,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemDto,
            CartLineView,
            CartConflicts,
            CartView,
            ShippingAddressRequest,
            ShippingAddressView,
            CheckoutSessionResponse,
            OrderLineView,
            OrderView,
            OrderList,
            auth_dto::RegisterRequest,
            auth_dto::LoginRequest,
            auth_dto::LoginResponse,
            product_dto::CreateProductRequest,
            product_dto::UpdateProductRequest,
            product_dto::ProductList,
            admin::ProductList,
            admin::UpdateOrderRequest,
            admin::InventoryAdjustRequest,
            admin::LowStockQuery,
            TopSellingEntry,
            TopSellingReport,
            MonthlyOrdersReport,
            StatusCountReport,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<CartView>,
            ApiResponse<OrderView>,
            ApiResponse<OrderList>,
            ApiResponse<product_dto::ProductList>,
            ApiResponse<admin::ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Checkout", description = "Checkout phases: shipping, payment handoff, confirmation"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
