//! Turns personas and a profile into [`WorkUnit`]s, and owns the output
//! directory layout.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::{ImageProfile, VideoProfile};
use crate::error::{Error, Result};
use crate::kie::GenerationRequest;
use crate::manifest::{Manifest, Persona};
use crate::pipeline::{ImageSource, UnitSource, WorkUnit};

/// `<root>/<YYYY-MM-DD>/artifacts/<kind>`
pub fn dated_dir(root: &Path, date: NaiveDate, kind: &str) -> PathBuf {
    root.join(date.format("%Y-%m-%d").to_string())
        .join("artifacts")
        .join(kind)
}

pub fn image_request(profile: &ImageProfile, prompt: &str) -> GenerationRequest {
    GenerationRequest::new(profile.model.as_str())
        .with_input("prompt", prompt)
        .with_input("output_format", profile.output_format.as_str())
        .with_input("aspect_ratio", profile.aspect_ratio.as_str())
        .with_input("resolution", profile.resolution.as_str())
}

/// Video request without its image; the pipeline adds `image_urls`.
pub fn video_request(profile: &VideoProfile, prompt: &str) -> GenerationRequest {
    GenerationRequest::new(profile.model.as_str())
        .with_input("prompt", prompt)
        .with_input("mode", profile.mode.as_str())
        .with_input("duration", profile.duration.as_str())
}

pub fn image_units(personas: &[&Persona], profile: &ImageProfile, out_dir: &Path) -> Vec<WorkUnit> {
    personas
        .iter()
        .map(|p| WorkUnit {
            id: p.id.clone(),
            label: p.label().to_string(),
            target: out_dir.join(format!("{}.{}", p.id, profile.output_format)),
            source: UnitSource::Ready(image_request(profile, &p.prompt)),
        })
        .collect()
}

/// One unit per persona. The image is the persona's `image_url` when set,
/// otherwise `<images_dir>/<id>.png`.
pub fn video_units(
    personas: &[&Persona],
    profile: &VideoProfile,
    images_dir: &Path,
    out_dir: &Path,
) -> Vec<WorkUnit> {
    personas
        .iter()
        .map(|p| {
            let image = match p.image_url.as_deref().filter(|u| !u.trim().is_empty()) {
                Some(url) => ImageSource::Url(url.to_string()),
                None => ImageSource::File(images_dir.join(format!("{}.png", p.id))),
            };
            let prompt = p
                .motion_prompt
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(profile.default_motion_prompt.as_str());
            video_unit(&p.id, p.label(), image, prompt, profile, out_dir)
        })
        .collect()
}

/// Units for scanned images that have no manifest entry. They animate with
/// the profile's default motion prompt. A non-empty `only` restricts the set.
pub fn scanned_video_units(
    scanned: &[(String, PathBuf)],
    manifest: &Manifest,
    only: &[String],
    profile: &VideoProfile,
    out_dir: &Path,
) -> Vec<WorkUnit> {
    scanned
        .iter()
        .filter(|(id, _)| manifest.get(id).is_none())
        .filter(|(id, _)| only.is_empty() || only.contains(id))
        .map(|(id, path)| {
            video_unit(
                id,
                id,
                ImageSource::File(path.clone()),
                &profile.default_motion_prompt,
                profile,
                out_dir,
            )
        })
        .collect()
}

/// The video work list: manifest personas first, then scanned images the
/// manifest does not cover.
///
/// An empty `only` takes everything. Otherwise every id in `only` must name
/// a persona or a scanned image, and only those are planned.
pub fn plan_video_units(
    manifest: &Manifest,
    scanned: &[(String, PathBuf)],
    only: &[String],
    profile: &VideoProfile,
    images_dir: &Path,
    out_dir: &Path,
) -> Result<Vec<WorkUnit>> {
    if let Some(unknown) = only
        .iter()
        .find(|id| manifest.get(id).is_none() && !scanned.iter().any(|(stem, _)| stem == *id))
    {
        return Err(Error::Configuration(format!(
            "no persona or image named {unknown:?}"
        )));
    }

    let personas: Vec<&Persona> = manifest
        .personas
        .iter()
        .filter(|p| only.is_empty() || only.contains(&p.id))
        .collect();
    let mut units = video_units(&personas, profile, images_dir, out_dir);
    units.extend(scanned_video_units(scanned, manifest, only, profile, out_dir));
    Ok(units)
}

pub fn video_unit(
    id: &str,
    label: &str,
    image: ImageSource,
    prompt: &str,
    profile: &VideoProfile,
    out_dir: &Path,
) -> WorkUnit {
    WorkUnit {
        id: id.to_string(),
        label: label.to_string(),
        target: out_dir.join(format!("{id}.mp4")),
        source: UnitSource::ImageToVideo {
            image,
            request: video_request(profile, prompt),
        },
    }
}
