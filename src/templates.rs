use axum::response::Html;
use log::info;
use tera::{Context, Tera};

use crate::error::AppError;

pub fn load(glob: &str) -> tera::Result<Tera> {
    let templates = Tera::new(glob)?;
    info!(
        "Loaded {} templates from {}",
        templates.get_template_names().count(),
        glob
    );
    Ok(templates)
}

pub fn render(templates: &Tera, name: &str, context: &Context) -> Result<Html<String>, AppError> {
    Ok(Html(templates.render(name, context)?))
}
