/// `orders` 表定义，字段与 [`crate::order::OrderRow`] 对应
pub const ORDERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_id    VARCHAR(50)    PRIMARY KEY,
    customer_id VARCHAR(50)    NOT NULL,
    quantity    INTEGER        NOT NULL CHECK (quantity > 0),
    price       NUMERIC(10, 2) NOT NULL CHECK (price >= 0),
    status      VARCHAR(20)    NOT NULL,
    created_at  TIMESTAMPTZ    NOT NULL,
    updated_at  TIMESTAMPTZ    NOT NULL CHECK (updated_at >= created_at),
    version     BIGINT         NOT NULL DEFAULT 0
)
"#;
