/// Header names shared by the HTTP handlers and their clients

/// Session token returned by `/verify`, sent back to read a drop
pub const SESSION_HEADER: &str = "x-drop-session";

/// Original file name for `PUT /api/drops/:id/file`
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// `t=<unix>,v1=<hex>` signature on payment webhooks
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
