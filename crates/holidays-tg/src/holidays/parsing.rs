use crate::error::fatal;
use crate::Result;
use scraper::{Html, Selector};

/// Every holiday is a `span` right inside of the `div.main` block of a
/// listing item. The picture of the holiday is wrapped into a `span` as well,
/// so it is excluded explicitly.
const HOLIDAY_SELECTOR: &str = ".listing_wr div.main > span:not(.img_wrapper)";

/// Extracts the holiday names from the page in document order.
/// Markup changes on the page are likely to show up as an empty list.
pub(crate) fn parse_holidays(html: &str) -> Result<Vec<String>> {
    let selector = Selector::parse(HOLIDAY_SELECTOR)
        .map_err(|err| fatal!("Invalid holidays selector {HOLIDAY_SELECTOR}: {err:?}"))?;

    let document = Html::parse_document(html);

    let holidays = document
        .select(&selector)
        .map(|element| element.text().collect::<String>().trim().to_owned())
        .filter(|holiday| !holiday.is_empty())
        .collect();

    Ok(holidays)
}
