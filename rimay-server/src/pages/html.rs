//! Minimal HTML rendering for the management pages.

use std::fmt::Write;

use rimay_core::constants::APP_NAME;
use rimay_core::error::FieldErrors;
use rimay_models::queries::Page;
use rimay_models::models::session::FlashMessage;

/// Escape text for HTML element content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Navigation shown to logged-in users.
const NAV: &[(&str, &str)] = &[
    ("/dashboard/", "Dashboard"),
    ("/community/", "Mi comunidad"),
    ("/community/members/", "Miembros"),
    ("/incident/", "Incidentes"),
    ("/profile/", "Perfil"),
    ("/logout/", "Salir"),
];

/// Full page around `body`. Flash messages may carry trusted markup.
pub fn layout(title: &str, username: Option<&str>, flashes: &[FlashMessage], body: &str) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} | {APP_NAME}</title>\n</head>\n<body>\n",
        escape(title)
    );
    if let Some(username) = username {
        out.push_str("<nav>");
        for (href, label) in NAV {
            let _ = write!(out, "<a href=\"{href}\">{label}</a> ");
        }
        let _ = writeln!(out, "<span class=\"user\">{}</span></nav>", escape(username));
    }
    for flash in flashes {
        let _ = writeln!(
            out,
            "<div class=\"alert alert-{}\">{}</div>",
            flash.level.as_str(),
            flash.message
        );
    }
    let _ = write!(out, "<main>\n<h1>{}</h1>\n{body}\n</main>\n</body>\n</html>\n", escape(title));
    out
}

/// Field error list under an input, empty when the field is fine.
pub fn field_errors(errors: &FieldErrors, field: &str) -> String {
    errors
        .get(field)
        .iter()
        .map(|m| format!("<p class=\"error\">{}</p>", escape(m)))
        .collect()
}

/// Labeled text input with its errors.
pub fn input(kind: &str, name: &str, label: &str, value: &str, errors: &FieldErrors) -> String {
    format!(
        "<p><label for=\"id_{name}\">{label}</label>\
         <input type=\"{kind}\" name=\"{name}\" id=\"id_{name}\" value=\"{}\">{}</p>\n",
        escape(value),
        field_errors(errors, name)
    )
}

/// `<select>` with a blank "any" option; `options` are (value, label).
pub fn select(name: &str, label: &str, options: &[(String, String)], selected: Option<&str>) -> String {
    let mut out = format!("<label for=\"id_{name}\">{label}</label><select name=\"{name}\" id=\"id_{name}\">");
    out.push_str("<option value=\"\">---------</option>");
    for (value, text) in options {
        let mark = if selected == Some(value.as_str()) { " selected" } else { "" };
        let _ = write!(out, "<option value=\"{}\"{mark}>{}</option>", escape(value), escape(text));
    }
    out.push_str("</select>\n");
    out
}

/// Previous/next links keeping the current filters.
pub fn pager<T>(page: &Page<T>, base_query: &str) -> String {
    if page.num_pages() <= 1 {
        return String::new();
    }
    let link = |n: u32| {
        if base_query.is_empty() {
            format!("?page={n}")
        } else {
            format!("?{base_query}&page={n}")
        }
    };
    let mut out = String::from("<div class=\"pagination\">");
    if page.has_previous() {
        let _ = write!(out, "<a href=\"{}\">&laquo; Anterior</a> ", escape(&link(page.page - 1)));
    }
    let _ = write!(out, "<span>Página {} de {}</span>", page.page, page.num_pages());
    if page.has_next() {
        let _ = write!(out, " <a href=\"{}\">Siguiente &raquo;</a>", escape(&link(page.page + 1)));
    }
    out.push_str("</div>\n");
    out
}

/// Query string of the non-empty filter values.
pub fn query_string(pairs: &[(&str, Option<&str>)]) -> String {
    pairs
        .iter()
        .filter_map(|(k, v)| v.map(str::trim).filter(|v| !v.is_empty()).map(|v| (k, v)))
        .map(|(k, v)| format!("{k}={}", encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

pub fn yes_no(b: bool) -> &'static str {
    if b {
        "Sí"
    } else {
        "No"
    }
}
