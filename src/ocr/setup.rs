use anyhow::{anyhow, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::paths::get_tesseract_dir;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[cfg(windows)]
const EXE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

#[cfg(windows)]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];
#[cfg(not(windows))]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Splits a tesseract language string (`jpn+eng`) into model names.
pub fn language_models(language: &str) -> Vec<&str> {
    language
        .split('+')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

fn has_models(dir: &Path, language: &str) -> bool {
    language_models(language)
        .iter()
        .all(|lang| dir.join(format!("{}.traineddata", lang)).exists())
}

/// Finds the Tesseract executable, checking our local dir first, then system
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(EXE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    COMMON_INSTALL_DIRS
        .iter()
        .map(|dir| PathBuf::from(dir).join(EXE_NAME))
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory holding every model `language` names.
pub fn find_tessdata_dir(language: &str) -> Result<PathBuf> {
    let local_tessdata = get_tesseract_dir().join("tessdata");
    if has_models(&local_tessdata, language) {
        return Ok(local_tessdata);
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        for candidate in [p.clone(), p.join("tessdata")] {
            if has_models(&candidate, language) {
                return Ok(candidate);
            }
        }
    }

    SYSTEM_TESSDATA_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|p| has_models(p, language))
        .ok_or_else(|| {
            anyhow!(
                "tessdata directory not found. Please ensure {} traineddata is available.",
                language
            )
        })
}

/// Ensures trained data for `language` is present, downloading missing models
/// into the local tessdata directory. Returns the directory to use.
pub fn ensure_traineddata(language: &str) -> Result<PathBuf> {
    if let Ok(dir) = find_tessdata_dir(language) {
        log::info!("tessdata found at: {}", dir.display());
        return Ok(dir);
    }

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    fs::create_dir_all(&tessdata_dir)?;
    log::info!("tessdata for {} missing, downloading...", language);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    for lang in language_models(language) {
        let target = tessdata_dir.join(format!("{}.traineddata", lang));
        if target.exists() {
            continue;
        }
        download_model(&client, lang, &target)?;
    }

    Ok(tessdata_dir)
}

fn download_model(client: &reqwest::blocking::Client, lang: &str, target: &Path) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, lang);
    log::info!("Downloading {}.traineddata...", lang);

    let response = client
        .get(&url)
        .header("User-Agent", "campus-scan")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            lang,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(target)?;
    file.write_all(&bytes)?;

    log::info!("Downloaded {}.traineddata ({} bytes)", lang, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_models_split() {
        assert_eq!(language_models("jpn+eng"), vec!["jpn", "eng"]);
        assert_eq!(language_models("eng"), vec!["eng"]);
        assert!(language_models("").is_empty());
    }

    #[test]
    fn test_has_models_requires_all() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("eng.traineddata"), b"x").unwrap();
        assert!(has_models(dir.path(), "eng"));
        assert!(!has_models(dir.path(), "jpn+eng"));

        fs::write(dir.path().join("jpn.traineddata"), b"x").unwrap();
        assert!(has_models(dir.path(), "jpn+eng"));
    }
}
