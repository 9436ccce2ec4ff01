use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::{ContactInfo, ListingPage, ListingRecord, Ward};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Extraction strategy for the portal's pages.
pub trait PageParser {
    fn parse_listing(&self, html: &str) -> ListingPage;
    fn parse_contact(&self, html: &str) -> ContactInfo;
    fn parse_csrf_token(&self, html: &str) -> Result<String, ParseError>;
    fn parse_wards(&self, html: &str) -> Result<Vec<Ward>, ParseError>;
}

/// CSS-selector scanner over the Idox page fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlPageParser;

impl PageParser for HtmlPageParser {
    fn parse_listing(&self, html: &str) -> ListingPage {
        parse_listing(html)
    }

    fn parse_contact(&self, html: &str) -> ContactInfo {
        parse_contact(html)
    }

    fn parse_csrf_token(&self, html: &str) -> Result<String, ParseError> {
        parse_csrf_token(html)
    }

    fn parse_wards(&self, html: &str) -> Result<Vec<Ward>, ParseError> {
        parse_wards(html)
    }
}

static RE_KEY_VAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"keyVal=([^&#]+)").expect("invalid regex: keyVal"));
static RE_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"searchCriteria\.page=(\d+)").expect("invalid regex: page number")
});
static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Mr|Mrs|Ms|Miss|Dr)\b\.?\s*").expect("invalid regex: name title")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e:?}"))
}

static SEL_RESULT: LazyLock<Selector> = LazyLock::new(|| selector("li.searchresult"));
static SEL_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static SEL_ADDRESS: LazyLock<Selector> = LazyLock::new(|| selector("p.address"));
static SEL_NEXT: LazyLock<Selector> = LazyLock::new(|| selector("a.next[href]"));
static SEL_AGENTS: LazyLock<Selector> = LazyLock::new(|| selector("div.agents"));
static SEL_PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static SEL_ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static SEL_TH: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static SEL_TD: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static SEL_CSRF: LazyLock<Selector> = LazyLock::new(|| selector(r#"input[name="_csrf"]"#));
static SEL_WARD_SELECT: LazyLock<Selector> = LazyLock::new(|| selector("select#ward"));
static SEL_OPTION: LazyLock<Selector> = LazyLock::new(|| selector("option"));

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Removes a leading Mr/Mrs/Ms/Miss/Dr title from a contact name.
pub fn strip_title(name: &str) -> String {
    RE_TITLE.replace(name.trim(), "").trim().to_string()
}

pub fn parse_listing(html: &str) -> ListingPage {
    let document = Html::parse_document(html);

    let next_page = document
        .select(&SEL_NEXT)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| RE_PAGE.captures(href)?[1].parse::<u32>().ok());

    let records = document
        .select(&SEL_RESULT)
        .filter_map(|result| {
            let record_id = result
                .select(&SEL_LINK)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| RE_KEY_VAL.captures(href).map(|c| c[1].to_string()))?;

            let address = result
                .select(&SEL_ADDRESS)
                .next()
                .map(|p| normalize_whitespace(&elem_text(p)))
                .and_then(non_empty)?;

            Some(ListingRecord { record_id, address })
        })
        .collect();

    ListingPage { next_page, records }
}

pub fn parse_contact(html: &str) -> ContactInfo {
    let document = Html::parse_document(html);

    let Some(agents) = document.select(&SEL_AGENTS).next() else {
        return ContactInfo::default();
    };

    let name = agents
        .select(&SEL_PARAGRAPH)
        .next()
        .map(|p| strip_title(&normalize_whitespace(&elem_text(p))))
        .and_then(non_empty);

    let email = agents
        .select(&SEL_ROW)
        .find(|row| {
            row.select(&SEL_TH)
                .next()
                .is_some_and(|th| elem_text(th).to_lowercase().contains("email"))
        })
        .and_then(|row| row.select(&SEL_TD).next())
        .map(|td| normalize_whitespace(&elem_text(td)))
        .and_then(non_empty);

    ContactInfo { name, email }
}

pub fn parse_csrf_token(html: &str) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    document
        .select(&SEL_CSRF)
        .filter_map(|input| input.value().attr("value"))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingField("_csrf token".to_string()))
}

pub fn parse_wards(html: &str) -> Result<Vec<Ward>, ParseError> {
    let document = Html::parse_document(html);
    let select = document
        .select(&SEL_WARD_SELECT)
        .next()
        .ok_or_else(|| ParseError::MissingField(r#"<select id="ward">"#.to_string()))?;

    Ok(select
        .select(&SEL_OPTION)
        .filter_map(|option| {
            let value = option.value().attr("value")?.trim();
            if value.is_empty() {
                return None;
            }
            Some(Ward {
                value: value.to_string(),
                name: normalize_whitespace(&elem_text(option)),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_listing_first_page_fixture() {
        let html = fs::read_to_string("fixtures/listing_first_page.html")
            .expect("Failed to read fixture");

        let page = parse_listing(&html);

        assert_eq!(page.next_page, Some(2));
        assert_eq!(page.records.len(), 2, "Records without an address or keyVal are skipped");
        assert_eq!(page.records[0].record_id, "S8QZ1AFHJ1A00");
        assert_eq!(page.records[0].address, "1 Fleet Place London EC4M 7RA");
        assert_eq!(page.records[1].record_id, "S8R2C4FHJ2B00");
        assert_eq!(page.records[1].address, "12 Cheapside, London, EC2V 6AA");
    }

    #[test]
    fn test_parse_listing_last_page_has_no_next() {
        let html = fs::read_to_string("fixtures/listing_last_page.html")
            .expect("Failed to read fixture");

        let page = parse_listing(&html);

        assert_eq!(page.next_page, None);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].address, "80 Moorgate, London, EC2M 6SE");
    }

    #[test]
    fn test_parse_listing_fragment_without_next_anchor() {
        let html = r#"
            <ul id="searchresults">
                <li class="searchresult">
                    <a href="applicationDetails.do?keyVal=ABC123&activeTab=summary">Works</a>
                    <p class="address">2 Bread Street</p>
                </li>
            </ul>
        "#;

        let page = parse_listing(html);

        assert!(page.next_page.is_none());
        assert_eq!(
            page.records,
            vec![ListingRecord {
                record_id: "ABC123".to_string(),
                address: "2 Bread Street".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_listing_garbage_is_empty() {
        let page = parse_listing("<<<not really html");
        assert_eq!(page, ListingPage::default());
    }

    #[test]
    fn test_parse_contact_fixture() {
        let html = fs::read_to_string("fixtures/contacts.html").expect("Failed to read fixture");

        let contact = parse_contact(&html);

        assert_eq!(contact.name.as_deref(), Some("John Smith"));
        assert_eq!(contact.email.as_deref(), Some("john@example.com"));
    }

    #[test]
    fn test_parse_contact_fragment_strips_title() {
        let html = r#"
            <div class="agents">
                <p>Mr. John Smith</p>
                <table><tr><th scope="row">Email</th><td>john@example.com</td></tr></table>
            </div>
        "#;

        let contact = parse_contact(html);

        assert_eq!(
            contact,
            ContactInfo {
                name: Some("John Smith".to_string()),
                email: Some("john@example.com".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_contact_without_email() {
        let html = r#"<div class="agents"><p>Dr Ada Byron</p></div>"#;

        let contact = parse_contact(html);

        assert_eq!(contact.name.as_deref(), Some("Ada Byron"));
        assert!(contact.email.is_none());
    }

    #[test]
    fn test_parse_contact_without_agents_block() {
        let html = r#"<p>Mr Nobody</p><table><tr><th>Email</th><td>x@y.com</td></tr></table>"#;
        assert_eq!(parse_contact(html), ContactInfo::default());
    }

    #[test]
    fn test_strip_title() {
        assert_eq!(strip_title("Mr. John Smith"), "John Smith");
        assert_eq!(strip_title("MRS Jane Doe"), "Jane Doe");
        assert_eq!(strip_title("miss  Ann Lee"), "Ann Lee");
        assert_eq!(strip_title("Ms Kay"), "Kay");
        assert_eq!(strip_title("Dr. Who"), "Who");
        assert_eq!(strip_title("Drew Barry"), "Drew Barry");
        assert_eq!(strip_title("Acme Architects Ltd"), "Acme Architects Ltd");
    }

    #[test]
    fn test_parse_csrf_token() {
        let html = fs::read_to_string("fixtures/search_page.html").expect("Failed to read fixture");
        assert_eq!(
            parse_csrf_token(&html).unwrap(),
            "7a4c2e8f-31b9-4c55-9d0e-1f2a3b4c5d6e"
        );
    }

    #[test]
    fn test_parse_csrf_token_missing() {
        let err = parse_csrf_token("<form><input name=\"q\" /></form>").unwrap_err();
        assert!(err.to_string().contains("_csrf"));
    }

    #[test]
    fn test_parse_wards() {
        let html = fs::read_to_string("fixtures/monthly_list.html").expect("Failed to read fixture");

        let wards = parse_wards(&html).expect("Should find the ward select");

        assert_eq!(wards.len(), 3, "The empty 'All' option is skipped");
        assert_eq!(
            wards[0],
            Ward {
                value: "ALD".to_string(),
                name: "Aldersgate".to_string(),
            }
        );
        assert_eq!(wards[2].name, "Cheap");
    }

    #[test]
    fn test_parse_wards_missing_select() {
        assert!(parse_wards("<select id=\"month\"></select>").is_err());
    }
}
