//! Computed fields applied by the write path before a record is persisted.

use crate::db::models::{BlogPatch, NewBlog, NewProject, ProjectPatch};

const WORDS_PER_MINUTE: usize = 200;

/// ASCII spelling of a lowercase Latin letter with a diacritic or ligature.
fn fold_latin(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' | 'ĉ' | 'ċ' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' | 'ĝ' | 'ġ' | 'ģ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ķ' => "k",
        'ł' | 'ľ' | 'ĺ' | 'ļ' => "l",
        'ñ' | 'ń' | 'ň' | 'ņ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ř' => "r",
        'ß' => "ss",
        'ś' | 'š' | 'ş' | 'ș' => "s",
        'ť' | 'ţ' | 'ț' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

/// URL-safe slug: lowercase ASCII alphanumerics separated by single dashes.
/// Latin letters with diacritics are folded to their ASCII base first.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        let mut buf = [0; 4];
        let text = if c.is_ascii_alphanumeric() {
            &*c.encode_utf8(&mut buf)
        } else if let Some(folded) = fold_latin(c) {
            folded
        } else {
            pending_dash = true;
            continue;
        };
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push_str(text);
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Minutes to read `content`: `ceil(words / 200)` over the markup-free text.
pub fn read_time(content: &str) -> i32 {
    let text = ammonia::Builder::empty().clean(content).to_string();
    let words = text.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE) as i32
}

/// Fills in the fields a record derives from its other fields.
pub trait DeriveFields {
    fn derive_fields(self) -> Self;
}

impl DeriveFields for NewProject {
    fn derive_fields(mut self) -> Self {
        self.slug = slugify(&self.title);
        self
    }
}

impl DeriveFields for ProjectPatch {
    fn derive_fields(mut self) -> Self {
        self.slug = self.title.as_deref().map(slugify);
        self
    }
}

impl DeriveFields for NewBlog {
    fn derive_fields(mut self) -> Self {
        self.slug = slugify(&self.title);
        self.read_time = read_time(&self.content);
        self
    }
}

impl DeriveFields for BlogPatch {
    fn derive_fields(mut self) -> Self {
        self.slug = self.title.as_deref().map(slugify);
        self.read_time = self.content.as_deref().map(read_time);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BlogCategory, ProjectCategory, ProjectStatus};

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("My First Project"), "my-first-project");
        assert_eq!(slugify("  Rust -- & Axum!! "), "rust-axum");
        assert_eq!(slugify("v1.2_beta"), "v1-2-beta");
        assert_eq!(slugify("..."), "untitled");
    }

    #[test]
    fn test_slugify_folds_latin_diacritics() {
        assert_eq!(slugify("Café Déjà vu"), "cafe-deja-vu");
        assert_eq!(slugify("Straße über Łódź"), "strasse-uber-lodz");
        assert_eq!(slugify("Ærø / 東京"), "aero");
    }

    #[test]
    fn test_read_time_rounds_up() {
        assert_eq!(read_time(""), 0);
        assert_eq!(read_time(&"word ".repeat(200)), 1);
        assert_eq!(read_time(&"word ".repeat(201)), 2);
        assert_eq!(read_time(&"<p>word</p> ".repeat(450)), 3);
    }

    #[test]
    fn test_project_patch_only_derives_when_title_present() {
        let patch = ProjectPatch {
            featured: Some(true),
            ..Default::default()
        }
        .derive_fields();
        assert_eq!(patch.slug, None);

        let patch = ProjectPatch {
            title: Some("New Title".into()),
            ..Default::default()
        }
        .derive_fields();
        assert_eq!(patch.slug.as_deref(), Some("new-title"));
    }

    #[test]
    fn test_blog_patch_derives_read_time_from_content() {
        let patch = BlogPatch {
            content: Some("word ".repeat(401)),
            ..Default::default()
        }
        .derive_fields();
        assert_eq!(patch.read_time, Some(3));
        assert_eq!(patch.slug, None);
    }

    #[test]
    fn test_new_records_get_derived_fields() {
        let project = NewProject {
            title: "Portfolio Site".into(),
            description: "d".into(),
            short_description: "s".into(),
            technologies: vec!["Rust".into()],
            category: ProjectCategory::Web,
            images: vec![],
            live_url: None,
            github_url: None,
            featured: false,
            status: ProjectStatus::Draft,
            slug: String::new(),
        }
        .derive_fields();
        assert_eq!(project.slug, "portfolio-site");

        let blog = NewBlog {
            title: "Hello World".into(),
            content: "word ".repeat(10),
            excerpt: "e".into(),
            author_id: "a".into(),
            tags: vec![],
            category: BlogCategory::News,
            featured_image: None,
            published: false,
            seo_title: None,
            seo_description: None,
            slug: String::new(),
            read_time: 0,
        }
        .derive_fields();
        assert_eq!(blog.slug, "hello-world");
        assert_eq!(blog.read_time, 1);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let patch = BlogPatch {
            title: Some("Same Title".into()),
            content: Some("one two three".into()),
            ..Default::default()
        };
        let once = patch.clone().derive_fields();
        let twice = once.clone().derive_fields();
        assert_eq!(once, twice);
    }
}
