use roxmltree::{Document, Node};

use super::types::RawHoldingRecord;

/// Decodes one per-filing information-table document into its holding
/// entries. Namespace prefixes and default-namespace declarations are
/// discarded structurally by matching on local element names, and matching
/// is case-insensitive since SEC tooling is inconsistent about tag casing.
///
/// A document with exactly one `infoTable` entry yields a one-element
/// vector; it must not read as "no holdings". Unparsable XML yields `None`
/// (logged), which tells the loader to skip this filing and keep going.
pub fn parse_info_table(content: &str) -> Option<Vec<RawHoldingRecord>> {
    let doc = match Document::parse(content) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("failed to parse information table XML: {}", e);
            return None;
        }
    };

    let entries = doc
        .root_element()
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("infoTable"))
        .map(entry_to_record)
        .collect();

    Some(entries)
}

fn entry_to_record(entry: Node) -> RawHoldingRecord {
    // Share amount and type live under shrsOrPrnAmt in the SEC schema, but
    // some exports flatten them onto the entry itself.
    let shares_node = child_element(entry, "shrsOrPrnAmt");
    let shares = shares_node
        .and_then(|n| child_text(n, "sshPrnamt"))
        .or_else(|| child_text(entry, "sshPrnamt"));
    let share_type = shares_node
        .and_then(|n| child_text(n, "sshPrnamtType"))
        .or_else(|| child_text(entry, "sshPrnamtType"));

    let voting = child_element(entry, "votingAuthority");

    RawHoldingRecord {
        name_of_issuer: child_text(entry, "nameOfIssuer").unwrap_or_default(),
        title_of_class: child_text(entry, "titleOfClass").unwrap_or_default(),
        cusip: child_text(entry, "cusip").unwrap_or_default(),
        value: child_text(entry, "value"),
        shares,
        share_type,
        put_call: child_text(entry, "putCall"),
        investment_discretion: child_text(entry, "investmentDiscretion"),
        other_manager: child_text(entry, "otherManager"),
        voting_authority_sole: voting.and_then(|n| child_text(n, "Sole")),
        voting_authority_shared: voting.and_then(|n| child_text(n, "Shared")),
        voting_authority_none: voting.and_then(|n| child_text(n, "None")),
    }
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name().eq_ignore_ascii_case(name))
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
