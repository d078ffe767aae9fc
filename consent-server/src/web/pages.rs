//! HTML page handler: serves the checker form.
//!
//! The page is a complete HTML document composed from a shared base layout
//! and the form markup + script, embedded at compile time via `include_str!`.

use axum::response::Html;

const BASE_CSS: &str = r#"* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: system-ui, -apple-system, 'Segoe UI', sans-serif; background: #fafafa; color: #111; }
.container { max-width: 56rem; margin: 0 auto; padding: 32px 16px; }
h1 { font-size: 32px; text-align: center; margin-bottom: 12px; }
.lead { text-align: center; color: #666; margin-bottom: 32px; }
.card { background: #fff; border: 1px solid #e5e5e5; border-radius: 8px; padding: 24px; margin-bottom: 24px; }
.card h2 { font-size: 18px; margin-bottom: 4px; }
.card .hint { color: #666; font-size: 14px; margin-bottom: 16px; }
form { display: flex; gap: 12px; }
input[type=url] { flex: 1; padding: 8px 12px; border: 1px solid #ccc; border-radius: 6px; font-size: 14px; }
button { padding: 8px 16px; border: 0; border-radius: 6px; background: #111; color: #fff; cursor: pointer; }
button:disabled { opacity: 0.6; cursor: wait; }
code { background: #f0f0f0; padding: 2px 8px; border-radius: 4px; font-size: 13px; word-break: break-all; }
.error { border-color: #fecaca; color: #dc2626; }
.pass { color: #16a34a; }
.fail { color: #dc2626; }
.unknown, .no_tracking { color: #ca8a04; }
.field { margin-top: 16px; }
.field h4 { font-size: 14px; margin-bottom: 4px; }
.details { font-size: 14px; color: #555; word-break: break-word; }
.hidden { display: none; }
footer { text-align: center; font-size: 13px; color: #888; margin-top: 32px; }"#;

fn render_page(body: &str) -> Html<String> {
    let mut s = String::with_capacity(body.len() + BASE_CSS.len() + 512);
    s.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    s.push_str("<meta charset=\"UTF-8\">\n");
    s.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    s.push_str("<title>Consent Mode Checker</title>\n");
    s.push_str("<style>\n");
    s.push_str(BASE_CSS);
    s.push_str("\n</style>\n");
    s.push_str("</head>\n<body>\n");
    s.push_str(body);
    s.push_str("\n</body>\n</html>");
    Html(s)
}

pub async fn page_index() -> Html<String> {
    render_page(include_str!("../../templates/index.html"))
}
