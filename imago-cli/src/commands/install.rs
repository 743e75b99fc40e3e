use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use imago_core::cancel::CancellationToken;
use imago_core::console;
use imago_core::error::ImagoError;
use imago_core::image::ImageDocument;
use imago_core::merge::merge_image;
use imago_core::package::{PackageDef, PackageDocument};
use imago_core::platform;
use imago_core::repository::{FileRepository, HttpRepository, Repository};
use imago_core::resolve::resolve_image;

pub struct InstallOptions {
    pub image: String,
    pub merge: bool,
    pub non_interactive: bool,
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub dry_run: bool,
    pub repositories: Vec<String>,
    pub installed: Option<PathBuf>,
    pub verbose: bool,
}

pub async fn run(options: InstallOptions) -> Result<()> {
    console::set_verbose(options.verbose);

    let input = if Path::new(&options.image).is_file() {
        fs::read_to_string(&options.image)?
    } else {
        options.image.clone()
    };

    let mut document = ImageDocument::parse(&input)?;

    // Flags override the document; the host platform fills what is left.
    if let Some(os) = options.os {
        document.os = Some(os);
    }
    if let Some(arch) = options.architecture {
        document.architecture = Some(arch);
    }
    if !options.repositories.is_empty() {
        let mut repositories = options.repositories.clone();
        repositories.extend(document.repositories);
        document.repositories = repositories;
    }
    if document.os.is_none() {
        document.os = Some(platform::current_os().to_string());
    }
    if document.architecture.is_none() {
        document.architecture = Some(platform::current_arch().to_string());
    }

    let image = document.into_builder()?.build()?;

    let image = if options.merge {
        let installed = load_installed(options.installed.as_deref())?;
        merge_image(
            &installed,
            image.roots,
            image.repositories,
            image.os,
            image.arch,
        )?
    } else {
        image
    };

    let repositories = open_repositories(&image.repositories)?;

    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handler.cancel();
        }
    });

    console::heading(&format!(
        "resolving {} root package(s) for {}/{}",
        image.roots.len(),
        image.os,
        image.arch
    ));

    let identifier = match resolve_image(&image, &repositories, &cancel).await {
        Ok(identifier) => identifier,
        Err(error) => {
            if let ImagoError::Dependency(dependency) = &error {
                console::verbose(&dependency.diagnostic);
            }
            return Err(error.into());
        }
    };

    if options.dry_run {
        for (name, version) in identifier.assignments() {
            println!("{name}={version}");
        }
        return Ok(());
    }

    for def in identifier.packages() {
        match &def.source_repository {
            Some(url) => console::info(&format!("install {} (from {})", def.identity, url)),
            None => console::info(&format!("install {} (side-loaded)", def.identity)),
        }
    }

    if !options.non_interactive {
        let prompt = format!("Deploy {} package(s)?", identifier.packages().len());
        if !confirm(&prompt)? {
            console::warn("aborted");
            return Ok(());
        }
    }

    console::info(&format!(
        "image resolved; {} package(s) ready for deployment",
        identifier.packages().len()
    ));

    Ok(())
}

fn load_installed(path: Option<&Path>) -> Result<Vec<PackageDef>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let data = fs::read_to_string(path)?;
    let documents: Vec<PackageDocument> = serde_json::from_str(&data)?;

    let mut installed = Vec::with_capacity(documents.len());
    for document in documents {
        installed.push(document.into_def(None).map_err(ImagoError::Parse)?);
    }
    Ok(installed)
}

fn open_repositories(urls: &[String]) -> Result<Vec<Repository>> {
    let mut repositories = Vec::with_capacity(urls.len());

    for url in urls {
        let repository = if url.starts_with("http://") || url.starts_with("https://") {
            Repository::Http(HttpRepository::new(url.clone()))
        } else {
            Repository::File(FileRepository::open(Path::new(url)).map_err(ImagoError::Repository)?)
        };
        repositories.push(repository);
    }

    Ok(repositories)
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;

    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
