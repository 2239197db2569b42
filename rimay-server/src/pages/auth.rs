//! Login, signup, logout and the profile page.

use axum::extract::State;
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use tracing::{debug, info};

use rimay_core::error::{FieldErrors, RimayError};
use rimay_models::models::session::FlashLevel;
use rimay_services::auth::{ProfileForm, SignupForm};

use crate::error::PageResult;
use crate::extract::SessionUser;
use crate::pages::html::{escape, input};
use crate::pages::{flash_and_redirect, found, render, render_anonymous};
use crate::state::AppState;

pub const LOGIN_FAILED: &str =
    "Por favor, introduzca un nombre de usuario y clave correctos. Observe que ambos campos pueden ser sensibles a mayúsculas.";
pub const PROFILE_SAVED: &str = "Perfil actualizado exitosamente.";

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

fn login_page(username: &str, error: Option<&str>) -> Response {
    let mut body = String::new();
    if let Some(error) = error {
        body.push_str(&format!("<p class=\"error\">{}</p>\n", escape(error)));
    }
    let none = FieldErrors::new();
    body.push_str("<form method=\"post\" action=\"/\">\n");
    body.push_str(&input("text", "username", "Usuario", username, &none));
    body.push_str(&input("password", "password", "Contraseña", "", &none));
    body.push_str("<button type=\"submit\">Ingresar</button>\n</form>\n");
    body.push_str("<p>¿No tienes cuenta? <a href=\"/signup/\">Regístrate</a></p>");
    render_anonymous("Login", &body)
}

/// `GET /`
pub async fn login_form() -> Response {
    login_page("", None)
}

/// `POST /`
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> PageResult {
    let username = form.username.as_deref().unwrap_or_default();
    let password = form.password.as_deref().unwrap_or_default();
    if username.trim().is_empty() || password.is_empty() {
        return Ok(login_page(username, Some(LOGIN_FAILED)));
    }

    let user = match state.registry.auth.authenticate(username, password) {
        Ok(user) => user,
        Err(RimayError::AuthFailed(_)) => return Ok(login_page(username, Some(LOGIN_FAILED))),
        Err(e) => return Err(e.into()),
    };
    let session = state.registry.auth.login_session(&user)?;
    info!("page login for {}", user.username);

    Ok((
        StatusCode::FOUND,
        [
            (LOCATION, "/dashboard/".to_string()),
            (SET_COOKIE, state.session_cookie(&session.key)),
        ],
    )
        .into_response())
}

fn signup_page(form: &SignupForm, errors: &FieldErrors) -> Response {
    let value = |v: &Option<String>| v.clone().unwrap_or_default();
    let mut body = String::from("<form method=\"post\" action=\"/signup/\">\n");
    body.push_str(&input("text", "username", "Usuario", &value(&form.username), errors));
    body.push_str(&input("text", "dni", "DNI", &value(&form.dni), errors));
    body.push_str(&input("text", "first_name", "Nombres", &value(&form.first_name), errors));
    body.push_str(&input("text", "last_name", "Apellidos", &value(&form.last_name), errors));
    body.push_str(&input("email", "email", "Correo electrónico", &value(&form.email), errors));
    body.push_str(&input("password", "password1", "Contraseña", "", errors));
    body.push_str(&input("password", "password2", "Confirmar contraseña", "", errors));
    body.push_str("<button type=\"submit\">Crear cuenta</button>\n</form>\n");
    body.push_str("<p>¿Ya tienes cuenta? <a href=\"/\">Inicia sesión</a></p>");
    render_anonymous("Registro", &body)
}

/// `GET /signup/`
pub async fn signup_form() -> Response {
    signup_page(&SignupForm::default(), &FieldErrors::new())
}

/// `POST /signup/`: a new account goes to the login page, not logged in.
pub async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> PageResult {
    match state.registry.auth.signup(&form) {
        Ok(_) => Ok(found("/")),
        Err(RimayError::Validation(errors)) => {
            debug!("signup rejected: {errors}");
            Ok((StatusCode::OK, signup_page(&form, &errors)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /logout/`
pub async fn logout(State(state): State<AppState>, current: SessionUser) -> PageResult {
    state.registry.auth.logout(&current.session.key)?;
    debug!("{} logged out", current.user.username);
    Ok((
        StatusCode::FOUND,
        [
            (LOCATION, "/".to_string()),
            (SET_COOKIE, state.expired_session_cookie()),
        ],
    )
        .into_response())
}

/// Profile form as posted: hidden coordinate inputs arrive as blank text.
#[derive(Debug, Default, Deserialize)]
pub struct RawProfileForm {
    pub bio: Option<String>,
    pub alias_name: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl RawProfileForm {
    fn into_form(self) -> ProfileForm {
        let number = |v: Option<String>| v.and_then(|s| s.trim().parse::<f64>().ok());
        ProfileForm {
            bio: self.bio,
            alias_name: self.alias_name,
            latitude: number(self.latitude),
            longitude: number(self.longitude),
        }
    }
}

/// `GET /profile/`
pub async fn profile_form(State(state): State<AppState>, current: SessionUser) -> PageResult {
    let profile = state.registry.auth.profile(current.id())?;
    let coord = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    let none = FieldErrors::new();

    let mut body = format!(
        "<p>{} &lt;{}&gt;</p>\n<form method=\"post\" action=\"/profile/\">\n",
        escape(&current.user.full_name()),
        escape(&current.user.email)
    );
    body.push_str(&format!(
        "<p><label for=\"id_bio\">Biografía</label><textarea name=\"bio\" id=\"id_bio\" rows=\"3\" \
         placeholder=\"Cuéntanos sobre ti...\">{}</textarea></p>\n",
        escape(profile.bio.as_deref().unwrap_or_default())
    ));
    body.push_str(&input("text", "alias_name", "Alias", profile.alias_name.as_deref().unwrap_or_default(), &none));
    body.push_str(&input("text", "latitude", "Latitud", &coord(profile.latitude), &none));
    body.push_str(&input("text", "longitude", "Longitud", &coord(profile.longitude), &none));
    body.push_str("<button type=\"submit\">Guardar</button>\n</form>");
    render(&state, &current, "Perfil", &body)
}

/// `POST /profile/`
pub async fn update_profile(
    State(state): State<AppState>,
    current: SessionUser,
    Form(form): Form<RawProfileForm>,
) -> PageResult {
    state.registry.auth.update_profile(current.id(), &form.into_form())?;
    flash_and_redirect(&state, &current, FlashLevel::Success, PROFILE_SAVED, "/profile/")
}
