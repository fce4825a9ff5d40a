use std::fmt;

use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::config::{HTTP_TIMEOUT, USER_AGENT};
use crate::error::BotError;
use crate::pagination::ResultRecord;

const BASE_URL: &str = "https://www.filmaffinity.com";
const NO_MATCHES: &str = "No se han encontrado coincidencias.";
/// Placeholder for any field the film page does not carry.
const MISSING: &str = "-";

static SEL_RESULT_TITLE: Lazy<Selector> = Lazy::new(|| sel("div.mc-title"));
static SEL_ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));
static SEL_BOLD: Lazy<Selector> = Lazy::new(|| sel("b"));
static SEL_MAIN_TITLE: Lazy<Selector> = Lazy::new(|| sel("h1#main-title span"));
static SEL_YEAR: Lazy<Selector> = Lazy::new(|| sel("dd[itemprop=\"datePublished\"]"));
static SEL_DURATION: Lazy<Selector> = Lazy::new(|| sel("dd[itemprop=\"duration\"]"));
static SEL_RATING: Lazy<Selector> = Lazy::new(|| sel("div#movie-rat-avg"));
static SEL_COUNTRY: Lazy<Selector> = Lazy::new(|| sel("span#country-img img"));
static SEL_DIRECTOR: Lazy<Selector> = Lazy::new(|| sel("a[itemprop=\"url\"]"));
static SEL_PRODUCER: Lazy<Selector> = Lazy::new(|| sel("dd.card-producer"));
static SEL_GENRE: Lazy<Selector> = Lazy::new(|| sel("span[itemprop=\"genre\"]"));
static SEL_SYNOPSIS: Lazy<Selector> = Lazy::new(|| sel("dd[itemprop=\"description\"]"));
static SEL_DT: Lazy<Selector> = Lazy::new(|| sel("dt"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Search filters of the advanced-search form. Empty strings mean "no
/// filter"; FilmAffinity ignores empty query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    pub from_year: String,
    pub to_year: String,
    pub country: String,
    pub genre: String,
    pub order_by: String,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            from_year: String::new(),
            to_year: String::new(),
            country: String::new(),
            genre: String::new(),
            order_by: "relevance".to_string(),
        }
    }
}

impl SearchFilters {
    /// Splits `/film` arguments into the query text and the flag values
    /// (`-from`, `-to`, `-country`, `-genre`, `-orderby`). A flag without
    /// a value is dropped.
    pub fn parse(args: &str) -> (String, Self) {
        let mut filters = Self::default();
        let mut query: Vec<&str> = Vec::new();
        let mut tokens = args.split_whitespace();
        while let Some(token) = tokens.next() {
            let slot = match token {
                "-from" => &mut filters.from_year,
                "-to" => &mut filters.to_year,
                "-country" => &mut filters.country,
                "-genre" => &mut filters.genre,
                "-orderby" => &mut filters.order_by,
                _ => {
                    query.push(token);
                    continue;
                }
            };
            if let Some(value) = tokens.next() {
                *slot = value.to_string();
            }
        }
        (query.join(" "), filters)
    }
}

/// FilmAffinity genre names → the site's search codes. Unknown names fall
/// back to an empty filter.
fn genre_code(genre: &str) -> &'static str {
    match genre {
        "accion" => "AC",
        "animacion" => "AN",
        "aventuras" => "AV",
        "belico" => "BE",
        "ciencia-ficcion" => "C-F",
        "negro" => "F-N",
        "comedia" => "CO",
        "desconocido" => "DESC",
        "documental" => "DO",
        "drama" => "DR",
        "fantastico" => "FAN",
        "infantil" => "INF",
        "intriga" => "INT",
        "musical" => "MU",
        "romance" => "RO",
        "serie" => "TV_SE",
        "terror" => "TE",
        "thriller" => "TH",
        "western" => "WE",
        _ => "",
    }
}

/// Full detail sheet of one film page. Fields absent on the page hold
/// `"-"`, never an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmDetail {
    pub title: String,
    pub year: String,
    pub duration: String,
    pub rating: String,
    pub country: String,
    pub director: String,
    pub cast: String,
    pub synopsis: String,
    pub genre: String,
    pub writer: String,
    pub composer: String,
    pub cinematographer: String,
    pub producer: String,
}

impl fmt::Display for FilmDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<b>[{}]</b> <b><i>{}</i></b> <code>({} {}-{})</code>\
             \n\n<code>Dirección:</code>     <b>{}</b>\
             \n\n<code>Reparto:</code>     <b>{}</b>\
             \n\n<code>Sinopsis:</code>     <b>{}</b>\
             \n\nOtros datos:\
             \n     <code>Género:</code>     <b>{}</b>\
             \n     <code>Guión:</code>     <b>{}</b>\
             \n     <code>Música:</code>     <b>{}</b>\
             \n     <code>Fotografía:</code>     <b>{}</b>\
             \n     <code>Productora:</code>     <b>{}</b>",
            self.rating,
            self.title,
            self.duration,
            self.year,
            self.country,
            self.director,
            self.cast,
            self.synopsis,
            self.genre,
            self.writer,
            self.composer,
            self.cinematographer,
            self.producer,
        )
    }
}

#[derive(Clone)]
pub struct FilmClient {
    http: Client,
    base_url: String,
}

impl FilmClient {
    pub fn new() -> Result<Self, BotError> {
        Ok(Self {
            http: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()?,
            base_url: BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(base_url: impl Into<String>) -> Result<Self, BotError> {
        let mut client = Self::new()?;
        client.base_url = base_url.into();
        Ok(client)
    }

    async fn fetch(&self, url: &str) -> Result<String, BotError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(BotError::Status {
                status: resp.status(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    /// Runs an advanced search and returns the ordered hit list. Zero
    /// matches is `NoResults`, not a fetch failure.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ResultRecord>, BotError> {
        let url = format!(
            "{}/es/advsearch.php?stext={}&country={}&genre={}&fromyear={}&toyear={}&orderby={}",
            self.base_url,
            urlencoding::encode(query),
            filters.country,
            genre_code(&filters.genre),
            filters.from_year,
            filters.to_year,
            filters.order_by,
        );
        let html = self.fetch(&url).await?;
        parse_search_results(&html)
    }

    /// Scrapes the full detail sheet of one film page.
    pub async fn fetch_detail(&self, link: &str) -> Result<FilmDetail, BotError> {
        let url = if link.starts_with("http") {
            link.to_string()
        } else {
            format!("{}{}", self.base_url, link)
        };
        let html = self.fetch(&url).await?;
        Ok(parse_detail(&html))
    }
}

/// Whitespace-normalized text of an element.
fn clean_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Year in the trailing `(yyyy)` of a result title block.
fn trailing_year(text: &str) -> String {
    let open = match text.rfind('(') {
        Some(i) => i,
        None => return String::new(),
    };
    text[open + 1..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect()
}

fn parse_search_results(html: &str) -> Result<Vec<ResultRecord>, BotError> {
    let doc = Html::parse_document(html);

    if doc
        .select(&SEL_BOLD)
        .any(|b| clean_text(&b) == NO_MATCHES)
    {
        return Err(BotError::NoResults);
    }

    let mut records: Vec<ResultRecord> = Vec::new();
    for block in doc.select(&SEL_RESULT_TITLE) {
        let Some(anchor) = block.select(&SEL_ANCHOR).next() else {
            continue;
        };
        let title = anchor
            .value()
            .attr("title")
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| clean_text(&anchor));
        let Some(link) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let year = trailing_year(&clean_text(&block));

        // an extraction-time invariant: the same hit never appears twice
        if records
            .iter()
            .any(|r| r.year == year && r.title == title && r.link == link)
        {
            continue;
        }
        records.push(ResultRecord {
            index: records.len() + 1,
            year,
            title,
            link: link.to_string(),
        });
    }

    Ok(records)
}

/// First `dd` following a `dt` whose label matches, within the credits list.
fn credit_after(doc: &Html, label: &str) -> Option<String> {
    for dt in doc.select(&SEL_DT) {
        if clean_text(&dt) != label {
            continue;
        }
        for sibling in dt.next_siblings() {
            if let Some(el) = ElementRef::wrap(sibling) {
                match el.value().name() {
                    "dd" => return Some(clean_text(&el)),
                    "dt" => break,
                    _ => {}
                }
            }
        }
    }
    None
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(|el| clean_text(&el))
        .filter(|t| !t.is_empty())
}

fn parse_detail(html: &str) -> FilmDetail {
    let doc = Html::parse_document(html);
    let missing = || MISSING.to_string();

    FilmDetail {
        title: first_text(&doc, &SEL_MAIN_TITLE).unwrap_or_else(missing),
        year: first_text(&doc, &SEL_YEAR).unwrap_or_else(missing),
        duration: first_text(&doc, &SEL_DURATION).unwrap_or_else(|| "- min.".to_string()),
        rating: first_text(&doc, &SEL_RATING).unwrap_or_else(missing),
        country: doc
            .select(&SEL_COUNTRY)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .map(|alt| alt.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(missing),
        director: first_text(&doc, &SEL_DIRECTOR).unwrap_or_else(missing),
        cast: credit_after(&doc, "Reparto").unwrap_or_else(missing),
        synopsis: first_text(&doc, &SEL_SYNOPSIS).unwrap_or_else(missing),
        genre: first_text(&doc, &SEL_GENRE).unwrap_or_else(missing),
        writer: credit_after(&doc, "Guion").unwrap_or_else(missing),
        composer: credit_after(&doc, "Música").unwrap_or_else(missing),
        cinematographer: credit_after(&doc, "Fotografía").unwrap_or_else(missing),
        producer: first_text(&doc, &SEL_PRODUCER).unwrap_or_else(missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <div class="mc-title">
            <a href="/es/film123456.html" title="El secreto de sus ojos">El secreto de sus ojos</a> (2009)
          </div>
          <div class="mc-title">
            <a href="/es/film654321.html" title="Nueve reinas">Nueve reinas</a> (2000)
          </div>
          <div class="mc-title">
            <a href="/es/film654321.html" title="Nueve reinas">Nueve reinas</a> (2000)
          </div>
        </body></html>"#;

    const DETAIL_PAGE: &str = r#"
        <html><body>
          <h1 id="main-title"><span>El secreto de sus ojos</span></h1>
          <dl>
            <dt>Año</dt><dd itemprop="datePublished">2009</dd>
            <dt>Duración</dt><dd itemprop="duration">129 min.</dd>
            <dt>Dirección</dt><dd><a itemprop="url">Juan José Campanella</a></dd>
            <dt>Guion</dt><dd>Eduardo Sacheri, Juan José Campanella</dd>
            <dt>Reparto</dt><dd>Ricardo Darín, Soledad Villamil</dd>
            <dt>Género</dt><dd><span itemprop="genre">Intriga</span></dd>
            <dt>Sinopsis</dt><dd itemprop="description">Un oficial retirado escribe una novela.</dd>
          </dl>
          <span id="country-img"><img alt="Argentina"></span>
          <div id="movie-rat-avg">8,1</div>
        </body></html>"#;

    #[test]
    fn parses_flags_out_of_the_query() {
        let (query, filters) = SearchFilters::parse("la gran familia -from 1960 -genre comedia");
        assert_eq!(query, "la gran familia");
        assert_eq!(filters.from_year, "1960");
        assert_eq!(filters.genre, "comedia");
        assert_eq!(filters.order_by, "relevance");
    }

    #[test]
    fn search_extraction_indexes_and_dedupes() {
        let records = parse_search_results(SEARCH_PAGE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].title, "El secreto de sus ojos");
        assert_eq!(records[0].year, "2009");
        assert_eq!(records[0].link, "/es/film123456.html");
        assert_eq!(records[1].index, 2);
    }

    #[test]
    fn explicit_no_matches_marker_is_no_results() {
        let html = format!("<html><body><b>{NO_MATCHES}</b></body></html>");
        assert!(matches!(
            parse_search_results(&html),
            Err(BotError::NoResults)
        ));
    }

    #[test]
    fn detail_extraction_fills_every_field() {
        let detail = parse_detail(DETAIL_PAGE);
        assert_eq!(detail.title, "El secreto de sus ojos");
        assert_eq!(detail.year, "2009");
        assert_eq!(detail.duration, "129 min.");
        assert_eq!(detail.rating, "8,1");
        assert_eq!(detail.country, "Argentina");
        assert_eq!(detail.director, "Juan José Campanella");
        assert_eq!(detail.cast, "Ricardo Darín, Soledad Villamil");
        assert_eq!(detail.writer, "Eduardo Sacheri, Juan José Campanella");
        assert_eq!(detail.genre, "Intriga");
        assert_eq!(detail.synopsis, "Un oficial retirado escribe una novela.");
    }

    #[test]
    fn absent_detail_fields_become_placeholders() {
        let detail = parse_detail("<html><body></body></html>");
        assert_eq!(detail.title, "-");
        assert_eq!(detail.rating, "-");
        assert_eq!(detail.duration, "- min.");
        assert_eq!(detail.cast, "-");
        assert_eq!(detail.composer, "-");
        assert_eq!(detail.cinematographer, "-");
        assert_eq!(detail.producer, "-");
    }

    #[test]
    fn detail_sheet_renders_the_spanish_layout() {
        let detail = parse_detail(DETAIL_PAGE);
        let sheet = detail.to_string();
        assert!(sheet.starts_with("<b>[8,1]</b>"));
        assert!(sheet.contains("<code>Dirección:</code>"));
        assert!(sheet.contains("<code>Productora:</code>     <b>-</b>"));
    }

    #[tokio::test]
    async fn search_hits_the_advanced_search_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/es/advsearch.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_PAGE))
            .mount(&server)
            .await;

        let client = FilmClient::with_base_url(server.uri()).unwrap();
        let records = client
            .search("nueve reinas", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = FilmClient::with_base_url(server.uri()).unwrap();
        let err = client
            .search("algo", &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Status { status, .. } if status.as_u16() == 503));
    }
}
