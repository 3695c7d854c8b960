//! Request composition
//!
//! Turns the caller's images into an ordered list of image parts and picks the
//! instruction text that refers to them by position ("image 1", "image 2", ...).

use crate::ai::mime::{mime_for_name, sniff_image_mime};
use crate::models::{
    GenerationRequest, ImagePart, LegCount, RequestMode, SourceImage, TableSelection, MAX_IMAGES,
};
use crate::{prompts, Error, Result};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Instruction text for a table request.
pub fn table_instruction(mode: RequestMode, legs: Option<LegCount>) -> String {
    let template = match mode {
        RequestMode::ShapeBaseFinish => prompts::TABLE,
        RequestMode::ShapeBaseFinishRoom => prompts::TABLE_IN_ROOM,
    };
    let mut instruction = prompts::render(template, &[]);

    if let Some(legs) = legs {
        instruction.push(' ');
        instruction.push_str(&prompts::render(
            prompts::LEGS,
            &[("legs", &legs.to_string())],
        ));
    }

    instruction
}

/// Build the request for the shape/base/finish(/room) workflow.
pub fn compose_table(selection: TableSelection) -> Result<GenerationRequest> {
    let mode = selection.mode();
    let legs = selection.legs;
    let images = image_parts(selection.into_images())?;

    if images.len() != mode.image_count() {
        return Err(Error::Invariant(format!(
            "{:?} expects {} images, got {}",
            mode,
            mode.image_count(),
            images.len()
        )));
    }

    Ok(GenerationRequest {
        images,
        instruction: table_instruction(mode, legs),
    })
}

/// Build a request from 1-5 arbitrary images and an optional prompt.
///
/// Without a prompt a single image gets a studio-shoot instruction and any
/// other count gets a generic "combine the subjects" instruction.
pub fn compose_freeform(
    images: Vec<SourceImage>,
    prompt: Option<String>,
) -> Result<GenerationRequest> {
    let images = image_parts(images)?;

    let instruction = match prompt.filter(|p| !p.trim().is_empty()) {
        Some(prompt) => prompt,
        None if images.len() == 1 => prompts::render(prompts::STUDIO, &[]),
        None => prompts::render(prompts::COMBINE, &[]),
    };

    Ok(GenerationRequest {
        images,
        instruction,
    })
}

/// Read source files in order. Each file is closed once read.
pub async fn load_sources(paths: &[PathBuf]) -> Result<Vec<SourceImage>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        sources.push(SourceImage::from_path(path).await?);
    }
    Ok(sources)
}

fn image_parts(images: Vec<SourceImage>) -> Result<Vec<ImagePart>> {
    if images.is_empty() || images.len() > MAX_IMAGES {
        return Err(Error::InvalidInput(format!(
            "Please provide between 1 and {} input images, got {}",
            MAX_IMAGES,
            images.len()
        )));
    }

    images
        .into_iter()
        .map(|image| {
            let mime_type = mime_for_name(&image.name)?;
            if let Some(sniffed) = sniff_image_mime(&image.bytes) {
                if sniffed != mime_type {
                    warn!(
                        "{} is named as {} but its content looks like {}",
                        image.name, mime_type, sniffed
                    );
                }
            }
            debug!("Image part {} ({}, {} bytes)", image.name, mime_type, image.bytes.len());
            Ok(ImagePart {
                data: image.bytes,
                mime_type: mime_type.to_string(),
            })
        })
        .collect()
}
