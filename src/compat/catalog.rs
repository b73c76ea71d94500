//! Built-in Capabilities
//!
//! Declarations for the host operations the engine ships with, and the host
//! versions at which their call shapes changed.

use serde::Serialize;
use super::binding::CapabilitySpec;
use super::host::{BindingScope, ReturnShape, TypeDescriptor};
use super::signature::{ParamSpec, SignatureVariant};
use super::version::HostVersion;

pub const SERVER_IMPLEMENTATIONS: &str = "Emby.Server.Implementations";
pub const ENCODING_MANAGER: &str = "Emby.Server.Implementations.MediaEncoder.EncodingManager";
pub const REFRESH_CHAPTER_IMAGES: &str = "RefreshChapterImages";

/// Name of the chapter image refresh capability
pub const CHAPTER_IMAGE_REFRESH: &str = "chapter-image-refresh";

/// First host build whose chapter image refresh takes a media source
pub const MEDIA_SOURCE_MILESTONE: HostVersion = HostVersion::new(4, 9, 0, 36);

/// A host version at which some call shape changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub name: &'static str,
    pub version: HostVersion,
    pub description: &'static str,
}

pub fn milestones() -> Vec<Milestone> {
    vec![Milestone {
        name: "media-source-chapter-images",
        version: MEDIA_SOURCE_MILESTONE,
        description: "RefreshChapterImages gained a leading MediaSourceInfo parameter",
    }]
}

/// Services the encoding manager's constructor takes, in order
pub fn encoding_manager_dependencies() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::new("MediaBrowser.Model.IO.IFileSystem"),
        TypeDescriptor::new("MediaBrowser.Model.Logging.ILogger"),
        TypeDescriptor::new("MediaBrowser.Controller.MediaEncoding.IMediaEncoder"),
        TypeDescriptor::new("MediaBrowser.Controller.Chapters.IChapterManager"),
        TypeDescriptor::new("MediaBrowser.Controller.Library.ILibraryManager"),
    ]
}

/// Video thumbnail refresh through the host's encoding manager.
///
/// Returns a deferred `bool`: whether any chapter image was written.
pub fn chapter_image_refresh() -> CapabilitySpec {
    let video = ParamSpec::new("video", "MediaBrowser.Controller.Entities.Video");
    let chapters = ParamSpec::new(
        "chapters",
        "System.Collections.Generic.List`1[MediaBrowser.Model.Entities.ChapterInfo]",
    );
    let extract_images = ParamSpec::new("extractImages", TypeDescriptor::boolean());
    let save_chapters = ParamSpec::new("saveChapters", TypeDescriptor::boolean());

    let with_media_source = SignatureVariant::new(
        "4.9.0.36+",
        vec![
            ParamSpec::new("mediaSource", "MediaBrowser.Model.Dto.MediaSourceInfo"),
            video.clone(),
            chapters.clone(),
            extract_images.clone(),
            save_chapters.clone(),
        ],
    )
    .since(MEDIA_SOURCE_MILESTONE);

    let legacy = SignatureVariant::new("pre-4.9.0.36", vec![video, chapters, extract_images, save_chapters]);

    CapabilitySpec::new(CHAPTER_IMAGE_REFRESH, SERVER_IMPLEMENTATIONS, ENCODING_MANAGER, REFRESH_CHAPTER_IMAGES)
        .scope(BindingScope::any_instance())
        .returns(ReturnShape::Deferred)
        .dependencies(encoding_manager_dependencies())
        .variant(with_media_source)
        .variant(legacy)
}

/// Every capability the engine ships with
pub fn builtin() -> Vec<CapabilitySpec> {
    vec![chapter_image_refresh()]
}
