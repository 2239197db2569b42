//! Query builders for list pages and joined views.
//!
//! Filtered, paginated listings for incidents, community members and
//! communities, plus the radius search behind the incident map. Filters are
//! compiled into parameterized SQL; nothing user-supplied is interpolated.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::{json, Value};

use rimay_core::error::{RimayError, RimayResult};

use crate::geo::GeoPoint;
use crate::models::community::Community;
use crate::models::community_membership::CommunityMembership;
use crate::models::incident::Incident;

// ─── Pagination ─────────────────────────────────────────────────────────────

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number actually served.
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn num_pages(&self) -> u32 {
        if self.total <= 0 || self.per_page == 0 {
            1
        } else {
            ((self.total as u64).div_ceil(self.per_page as u64)) as u32
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Clamp a requested page into range for `total` rows.
fn clamp_page(requested: u32, per_page: u32, total: i64) -> u32 {
    let pages = if total <= 0 || per_page == 0 {
        1
    } else {
        ((total as u64).div_ceil(per_page as u64)) as u32
    };
    requested.clamp(1, pages)
}

/// WHERE clause fragments with their positional values.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    fn push(&mut self, clause: &str, value: SqlValue) {
        self.values.push(value);
        self.clauses.push(clause.replace('?', &format!("?{}", self.values.len())));
    }

    fn push_fixed(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Placeholder index for the next appended value.
    fn next_index(&self) -> usize {
        self.values.len() + 1
    }
}

fn count(conn: &Connection, sql: &str, values: &[SqlValue]) -> RimayResult<i64> {
    conn.query_row(sql, params_from_iter(values.iter()), |r| r.get(0))
        .map_err(|e| RimayError::Database(e.to_string()))
}

// ─── Incident Queries ───────────────────────────────────────────────────────

/// Incident joined with its type, status and reporter.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentDetail {
    pub incident: Incident,
    pub type_name: String,
    pub type_icon: String,
    pub status_name: String,
    pub status_code: String,
    pub reporter_username: String,
    pub reporter_full_name: String,
}

const INCIDENT_DETAIL_SELECT: &str = "
    SELECT i.*,
        t.name AS type_name, t.icon AS type_icon,
        s.name AS status_name, s.code AS status_code,
        u.username AS reporter_username,
        u.first_name AS reporter_first_name, u.last_name AS reporter_last_name
    FROM incidents i
    JOIN incident_types t ON t.id = i.incident_type_id
    JOIN incident_statuses s ON s.id = i.incident_status_id
    JOIN users u ON u.id = i.reported_by";

impl IncidentDetail {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let first: String = row.get("reporter_first_name")?;
        let last: String = row.get("reporter_last_name")?;
        Ok(Self {
            incident: Incident::from_row(row)?,
            type_name: row.get("type_name")?,
            type_icon: row.get("type_icon")?,
            status_name: row.get("status_name")?,
            status_code: row.get("status_code")?,
            reporter_username: row.get("reporter_username")?,
            reporter_full_name: format!("{} {}", first.to_uppercase(), last.to_uppercase()),
        })
    }
}

/// Filters for the incident management list.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub incident_type_id: Option<i64>,
    pub incident_status_id: Option<i64>,
    pub active_only: bool,
}

pub fn incident_detail(conn: &Connection, id: i64) -> RimayResult<Option<IncidentDetail>> {
    let sql = format!("{INCIDENT_DETAIL_SELECT} WHERE i.id = ?1");
    conn.query_row(&sql, [id], IncidentDetail::from_row)
        .optional()
        .map_err(|e| RimayError::Database(e.to_string()))
}

/// Incidents matching the filter, newest first.
pub fn list_incidents(
    conn: &Connection,
    filter: &IncidentFilter,
    page: u32,
    per_page: u32,
) -> RimayResult<Page<IncidentDetail>> {
    let mut cond = Conditions::default();
    if let Some(t) = filter.incident_type_id {
        cond.push("i.incident_type_id = ?", SqlValue::Integer(t));
    }
    if let Some(s) = filter.incident_status_id {
        cond.push("i.incident_status_id = ?", SqlValue::Integer(s));
    }
    if filter.active_only {
        cond.push_fixed("i.is_active = 1");
    }
    let where_sql = cond.where_sql();

    let total = count(
        conn,
        &format!("SELECT COUNT(*) FROM incidents i {where_sql}"),
        &cond.values,
    )?;
    let page = clamp_page(page, per_page, total);

    let (li, oi) = (cond.next_index(), cond.next_index() + 1);
    let sql = format!(
        "{INCIDENT_DETAIL_SELECT} {where_sql}
         ORDER BY i.reported_at DESC, i.id DESC LIMIT ?{li} OFFSET ?{oi}"
    );
    let mut values = cond.values;
    values.push(SqlValue::Integer(per_page as i64));
    values.push(SqlValue::Integer(((page - 1) * per_page) as i64));

    let mut stmt = conn.prepare(&sql).map_err(|e| RimayError::Database(e.to_string()))?;
    let items = stmt
        .query_map(params_from_iter(values.iter()), IncidentDetail::from_row)
        .map_err(|e| RimayError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RimayError::Database(e.to_string()))?;

    Ok(Page { items, page, per_page, total })
}

/// Most recent active incidents, for the dashboard.
pub fn recent_active_incidents(conn: &Connection, limit: u32) -> RimayResult<Vec<IncidentDetail>> {
    let sql = format!(
        "{INCIDENT_DETAIL_SELECT} WHERE i.is_active = 1
         ORDER BY i.reported_at DESC, i.id DESC LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| RimayError::Database(e.to_string()))?;
    let rows = stmt
        .query_map([limit], IncidentDetail::from_row)
        .map_err(|e| RimayError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RimayError::Database(e.to_string()))?;
    Ok(rows)
}

/// Incident as shown on the map, from the viewpoint of one user.
#[derive(Debug, Clone, Serialize)]
pub struct MapIncident {
    pub detail: IncidentDetail,
    pub is_own: bool,
    pub was_notified: bool,
    pub notified_at: Option<String>,
    pub was_read: bool,
    pub distance_km: f64,
}

impl MapIncident {
    pub fn to_map_json(&self) -> Value {
        let i = &self.detail.incident;
        json!({
            "id": i.id,
            "title": i.title,
            "description": i.description,
            "latitude": i.latitude,
            "longitude": i.longitude,
            "severity_level": i.severity_level,
            "incident_type_name": self.detail.type_name,
            "status_name": self.detail.status_name,
            "is_own": self.is_own,
            "occurred_at": i.occurred_at,
            "reported_at": i.reported_at,
            "address": i.address,
            "was_notified": self.was_notified,
            "notified_at": self.notified_at,
            "was_read": self.was_read,
        })
    }
}

/// Active, located incidents within `radius_km` of `center`, newest first.
pub fn incidents_near(
    conn: &Connection,
    viewer_id: i64,
    center: &GeoPoint,
    radius_km: f64,
) -> RimayResult<Vec<MapIncident>> {
    let bbox = center.bounding_box(radius_km);
    let [(lng_lo1, lng_hi1), (lng_lo2, lng_hi2)] = bbox.lng_ranges();
    let sql = "
        SELECT i.*,
            t.name AS type_name, t.icon AS type_icon,
            s.name AS status_name, s.code AS status_code,
            u.username AS reporter_username,
            u.first_name AS reporter_first_name, u.last_name AS reporter_last_name,
            n.notification_sent_at AS n_sent_at, COALESCE(n.was_read, 0) AS n_was_read
        FROM incidents i
        JOIN incident_types t ON t.id = i.incident_type_id
        JOIN incident_statuses s ON s.id = i.incident_status_id
        JOIN users u ON u.id = i.reported_by
        LEFT JOIN incident_notifications n
            ON n.incident_id = i.id AND n.notified_user_id = ?1
        WHERE i.is_active = 1
          AND i.latitude IS NOT NULL AND i.longitude IS NOT NULL
          AND i.latitude BETWEEN ?2 AND ?3
          AND (i.longitude BETWEEN ?4 AND ?5 OR i.longitude BETWEEN ?6 AND ?7)
        ORDER BY i.reported_at DESC, i.id DESC";

    let mut stmt = conn.prepare(sql).map_err(|e| RimayError::Database(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![viewer_id, bbox.min_lat, bbox.max_lat, lng_lo1, lng_hi1, lng_lo2, lng_hi2],
            |row| {
                let detail = IncidentDetail::from_row(row)?;
                let sent_at: Option<String> = row.get("n_sent_at")?;
                Ok(MapIncident {
                    is_own: detail.incident.reported_by == viewer_id,
                    was_notified: sent_at.is_some(),
                    notified_at: sent_at,
                    was_read: row.get("n_was_read")?,
                    distance_km: 0.0,
                    detail,
                })
            },
        )
        .map_err(|e| RimayError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RimayError::Database(e.to_string()))?;

    Ok(rows
        .into_iter()
        .filter_map(|mut m| {
            let p = m.detail.incident.location()?;
            m.distance_km = center.distance_km(&p);
            (m.distance_km <= radius_km).then_some(m)
        })
        .collect())
}

// ─── Community Queries ──────────────────────────────────────────────────────

/// Membership joined with the member's account fields.
#[derive(Debug, Clone, Serialize)]
pub struct MemberRow {
    pub membership: CommunityMembership,
    pub username: String,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    pub role: Option<String>,
    pub is_verified: Option<bool>,
}

/// Members of a community, most recently joined first.
pub fn list_members(
    conn: &Connection,
    community_id: i64,
    filter: &MemberFilter,
    page: u32,
    per_page: u32,
) -> RimayResult<Page<MemberRow>> {
    let mut cond = Conditions::default();
    cond.push("m.community_id = ?", SqlValue::Integer(community_id));
    if let Some(role) = &filter.role {
        cond.push("m.role = ?", SqlValue::Text(role.clone()));
    }
    if let Some(v) = filter.is_verified {
        cond.push("m.is_verified = ?", SqlValue::Integer(v as i64));
    }
    let where_sql = cond.where_sql();

    let total = count(
        conn,
        &format!("SELECT COUNT(*) FROM community_memberships m {where_sql}"),
        &cond.values,
    )?;
    let page = clamp_page(page, per_page, total);

    let (li, oi) = (cond.next_index(), cond.next_index() + 1);
    let sql = format!(
        "SELECT m.*, u.username AS member_username, u.email AS member_email,
                u.first_name AS member_first_name, u.last_name AS member_last_name
         FROM community_memberships m JOIN users u ON u.id = m.user_id
         {where_sql}
         ORDER BY m.joined_at DESC, m.id DESC LIMIT ?{li} OFFSET ?{oi}"
    );
    let mut values = cond.values;
    values.push(SqlValue::Integer(per_page as i64));
    values.push(SqlValue::Integer(((page - 1) * per_page) as i64));

    let mut stmt = conn.prepare(&sql).map_err(|e| RimayError::Database(e.to_string()))?;
    let items = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let first: String = row.get("member_first_name")?;
            let last: String = row.get("member_last_name")?;
            Ok(MemberRow {
                membership: CommunityMembership::from_row(row)?,
                username: row.get("member_username")?,
                email: row.get("member_email")?,
                full_name: format!("{} {}", first.to_uppercase(), last.to_uppercase()),
            })
        })
        .map_err(|e| RimayError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RimayError::Database(e.to_string()))?;

    Ok(Page { items, page, per_page, total })
}

#[derive(Debug, Clone, Default)]
pub struct CommunityFilter {
    pub is_active: Option<bool>,
    pub postal_code: Option<String>,
}

/// Communities matching the filter, newest first.
pub fn list_communities(
    conn: &Connection,
    filter: &CommunityFilter,
    page: u32,
    per_page: u32,
) -> RimayResult<Page<Community>> {
    let mut cond = Conditions::default();
    if let Some(active) = filter.is_active {
        cond.push("is_active = ?", SqlValue::Integer(active as i64));
    }
    if let Some(pc) = &filter.postal_code {
        cond.push("postal_code = ?", SqlValue::Text(pc.clone()));
    }
    let where_sql = cond.where_sql();

    let total = count(conn, &format!("SELECT COUNT(*) FROM communities {where_sql}"), &cond.values)?;
    let page = clamp_page(page, per_page, total);

    let (li, oi) = (cond.next_index(), cond.next_index() + 1);
    let sql = format!(
        "SELECT * FROM communities {where_sql}
         ORDER BY created_at DESC, id DESC LIMIT ?{li} OFFSET ?{oi}"
    );
    let mut values = cond.values;
    values.push(SqlValue::Integer(per_page as i64));
    values.push(SqlValue::Integer(((page - 1) * per_page) as i64));

    let mut stmt = conn.prepare(&sql).map_err(|e| RimayError::Database(e.to_string()))?;
    let items = stmt
        .query_map(params_from_iter(values.iter()), Community::from_row)
        .map_err(|e| RimayError::Database(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RimayError::Database(e.to_string()))?;

    Ok(Page { items, page, per_page, total })
}
