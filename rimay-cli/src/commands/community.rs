//! Community commands.

use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use dialoguer::Confirm;

use rimay_core::config::AppConfig;
use rimay_core::error::{RimayError, RimayResult};
use rimay_models::{Community, GeoPoint, Polygon};
use rimay_services::community::{CommunityForm, CommunitySearch};

use super::{new_table, open_registry, print_json, truncate};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum CommunityAction {
    /// List communities.
    List {
        /// Only active (true) or inactive (false) communities.
        #[arg(long)]
        active: Option<bool>,
        /// Filter by postal code.
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
    },
    /// Show a community and its member count.
    Show { id: i64 },
    /// Create a community from a GeoJSON polygon file or a square around a point.
    Create {
        name: String,
        #[arg(long)]
        postal_code: String,
        #[arg(long)]
        description: Option<String>,
        /// File holding a GeoJSON Polygon.
        #[arg(long, conflicts_with = "around")]
        boundary: Option<PathBuf>,
        /// `LAT,LNG` center of a square boundary.
        #[arg(long, requires = "half_side")]
        around: Option<String>,
        /// Half side of the square in degrees.
        #[arg(long)]
        half_side: Option<f64>,
    },
    /// Delete a community and its memberships.
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

fn parse_point(s: &str) -> RimayResult<GeoPoint> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| RimayError::field("around", "expected LAT,LNG"))?;
    let parse = |v: &str| v.trim().parse::<f64>().ok();
    GeoPoint::from_parts(parse(lat), parse(lng)).ok_or_else(|| RimayError::field("around", "invalid coordinates"))
}

fn boundary_text(boundary: Option<PathBuf>, around: Option<String>, half_side: Option<f64>) -> RimayResult<Option<String>> {
    match (boundary, around) {
        (Some(path), _) => Ok(Some(std::fs::read_to_string(path)?)),
        (None, Some(around)) => {
            let center = parse_point(&around)?;
            let half_side = half_side.unwrap_or_default();
            Ok(Some(Polygon::square_around(&center, half_side).to_geojson_string()))
        }
        (None, None) => Ok(None),
    }
}

fn print_community(c: &Community, members: i64) {
    println!("{}", style(&c.name).bold().underlined());
    println!("  ID:           {}", c.id.unwrap_or_default());
    println!("  Postal code:  {}", c.postal_code);
    println!("  Active:       {}", c.is_active);
    println!("  Members:      {members}");
    println!("  Created:      {}", c.created_at);
    if !c.description.is_empty() {
        println!("  Description:  {}", c.description);
    }
    if let Some(boundary) = c.boundary() {
        let bb = boundary.bounding_box();
        println!(
            "  Bounds:       lat {:.5}..{:.5}, lng {:.5}..{:.5}",
            bb.min_lat, bb.max_lat, bb.min_lng, bb.max_lng
        );
    }
}

pub fn run(config: &AppConfig, action: CommunityAction, format: OutputFormat) -> RimayResult<()> {
    let registry = open_registry(config)?;
    let communities = &registry.community;

    match action {
        CommunityAction::List { active, postal_code, page } => {
            let search = CommunitySearch {
                is_active: active.map(|a| a.to_string()),
                postal_code,
                page: Some(page),
            };
            let page = communities.list(&search)?;
            match format {
                OutputFormat::Json => print_json(&page.items)?,
                OutputFormat::Text => {
                    let mut table = new_table(["ID", "Name", "Postal code", "Active", "Created"]);
                    for c in &page.items {
                        table.add_row(vec![
                            c.id.unwrap_or_default().to_string(),
                            truncate(&c.name, 40),
                            c.postal_code.clone(),
                            c.is_active.to_string(),
                            c.created_at.chars().take(10).collect(),
                        ]);
                    }
                    println!("{table}");
                    println!("  Page {} of {} ({} total)", page.page, page.num_pages(), page.total);
                }
            }
        }
        CommunityAction::Show { id } => {
            let (community, members) = communities
                .detail(id)?
                .ok_or_else(|| RimayError::NotFound(format!("community {id}")))?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "community": community, "members": members }))?,
                OutputFormat::Text => print_community(&community, members),
            }
        }
        CommunityAction::Create { name, postal_code, description, boundary, around, half_side } => {
            let form = CommunityForm {
                name: Some(name),
                description,
                postal_code: Some(postal_code),
                boundary_area: boundary_text(boundary, around, half_side)?,
            };
            let community = communities.create(&form).map_err(|e| {
                if let RimayError::Validation(errors) = &e {
                    eprintln!("  {} {errors}", style("ERROR").red().bold());
                }
                e
            })?;
            match format {
                OutputFormat::Json => print_json(&community)?,
                OutputFormat::Text => println!(
                    "  {} Created community {} (id {})",
                    style("OK").green().bold(),
                    community.name,
                    community.id.unwrap_or_default()
                ),
            }
        }
        CommunityAction::Delete { id, yes } => {
            let (community, members) = communities
                .detail(id)?
                .ok_or_else(|| RimayError::NotFound(format!("community {id}")))?;
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("  Delete {} and its {members} membership(s)?", community.name))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if !confirmed {
                println!("  Delete cancelled.");
                return Ok(());
            }
            Community::delete(&*registry.database.conn()?, id)?;
            println!("  {} Deleted community {}", style("OK").green().bold(), community.name);
        }
    }

    registry.shutdown_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        let p = parse_point("-12.05, -77.04").unwrap();
        assert_eq!(p.latitude, -12.05);
        assert_eq!(p.longitude, -77.04);
        assert!(parse_point("-12.05").is_err());
        assert!(parse_point("abc,1").is_err());
    }

    #[test]
    fn test_square_boundary_contains_center() {
        let text = boundary_text(None, Some("-0.2,-78.5".into()), Some(0.01)).unwrap().unwrap();
        let polygon = Polygon::from_geojson_str(&text).unwrap();
        assert!(polygon.contains(&GeoPoint::new(-0.2, -78.5)));
        assert!(!polygon.contains(&GeoPoint::new(-0.3, -78.5)));
        assert_eq!(boundary_text(None, None, None).unwrap(), None);
    }
}
