//! camt.053 `BkToCstmrAcctRpt` parser

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::raw;
use crate::money::{ensure_eur, Money};
use crate::types::*;

const ROOT: &str = "Document/BkToCstmrAcctRpt/Rpt";

pub const OPENING_BALANCE_CODE: &str = "OPBD";
pub const CLOSING_BALANCE_CODE: &str = "CLBD";

/// A parsed account report, validated in full
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// `Rpt/Id`
    pub document_id: String,
    /// `Rpt/CreDtTm`
    pub generated_at: DateTime<Utc>,
    /// IBAN of the reported account
    pub account: String,
    pub servicer: Servicer,
    pub opening_balance: StatementBalance,
    pub closing_balance: StatementBalance,
    /// Entries in document order
    pub entries: Vec<BankTransaction>,
}

impl Statement {
    /// Sum of the signed entry amounts
    pub fn net_movement(&self) -> LedgerResult<Money> {
        Money::checked_sum(self.entries.iter().map(BankTransaction::signed_amount))
    }

    /// Whether opening balance plus entries adds up to the closing balance
    pub fn is_balanced(&self) -> bool {
        self.net_movement()
            .ok()
            .and_then(|net| self.opening_balance.amount.checked_add(net))
            .map_or(false, |total| total == self.closing_balance.amount)
    }
}

/// Parse a camt.053 document.
///
/// Either the whole document is valid and a [`Statement`] is returned, or the
/// first problem found is reported as [`LedgerError::Parse`] naming its path.
pub fn parse_statement(xml: &[u8]) -> LedgerResult<Statement> {
    let text = std::str::from_utf8(xml)
        .map_err(|e| LedgerError::parse("Document", format!("not valid UTF-8: {e}")))?;
    let document: raw::Document = quick_xml::de::from_str(text)
        .map_err(|e| LedgerError::parse("Document", e.to_string()))?;

    let report = document
        .report
        .and_then(|r| r.rpt)
        .ok_or_else(|| missing(ROOT))?;

    let document_id = required(report.id.as_deref(), &format!("{ROOT}/Id"))?.to_string();
    let generated_at = parse_timestamp(
        required(report.created.as_deref(), &format!("{ROOT}/CreDtTm"))?,
        &format!("{ROOT}/CreDtTm"),
    )?;

    let account_path = format!("{ROOT}/Acct");
    let account_node = report.account.as_ref().ok_or_else(|| missing(&account_path))?;
    let account = required(
        account_node.id.as_ref().and_then(|id| id.iban.as_deref()),
        &format!("{account_path}/Id/IBAN"),
    )?
    .to_string();
    ensure_eur(required(
        account_node.currency.as_deref(),
        &format!("{account_path}/Ccy"),
    )?)?;
    let servicer = parse_servicer(account_node, &account_path)?;

    let opening_balance = parse_balance(&report.balances, OPENING_BALANCE_CODE)?;
    let closing_balance = parse_balance(&report.balances, CLOSING_BALANCE_CODE)?;

    let entries = report
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(entry, index, &account))
        .collect::<LedgerResult<Vec<_>>>()?;

    tracing::debug!(
        document_id = %document_id,
        account = %account,
        entries = entries.len(),
        "Parsed camt.053 statement"
    );

    Ok(Statement {
        document_id,
        generated_at,
        account,
        servicer,
        opening_balance,
        closing_balance,
        entries,
    })
}

fn parse_servicer(account: &raw::Account, account_path: &str) -> LedgerResult<Servicer> {
    let path = format!("{account_path}/Svcr/FinInstnId");
    let institution = account
        .servicer
        .as_ref()
        .and_then(|s| s.institution.as_ref())
        .ok_or_else(|| missing(&path))?;

    Ok(Servicer {
        bic: required(institution.bic.as_deref(), &format!("{path}/BIC"))?.to_string(),
        name: required(institution.name.as_deref(), &format!("{path}/Nm"))?.to_string(),
        street: required(
            institution.address.as_ref().and_then(|a| a.street.as_deref()),
            &format!("{path}/PstlAdr/StrtNm"),
        )?
        .to_string(),
    })
}

fn parse_balance(balances: &[raw::Balance], code: &str) -> LedgerResult<StatementBalance> {
    let path = format!("{ROOT}/Bal[Tp/CdOrPrtry/Cd={code}]");
    let balance = balances
        .iter()
        .find(|b| b.code() == Some(code))
        .ok_or_else(|| missing(&path))?;

    let amount = parse_amount(balance.amount.as_ref(), &format!("{path}/Amt"))?;
    let direction = match balance.indicator.as_deref().map(str::trim) {
        None => Direction::Credit,
        Some(indicator) => parse_direction(indicator, &format!("{path}/CdtDbtInd"))?,
    };
    let date = parse_date(
        required(balance.date.as_ref().and_then(|d| d.date.as_deref()), &format!("{path}/Dt/Dt"))?,
        &format!("{path}/Dt/Dt"),
    )?;

    Ok(StatementBalance {
        date,
        amount: match direction {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        },
    })
}

fn parse_entry(entry: &raw::Entry, index: usize, account: &str) -> LedgerResult<BankTransaction> {
    let path = format!("{ROOT}/Ntry[{index}]");
    let details_path = format!("{path}/NtryDtls/TxDtls");
    let details = entry
        .details
        .as_ref()
        .and_then(|d| d.transaction.as_ref())
        .ok_or_else(|| missing(&details_path))?;

    let direction = parse_direction(
        required(entry.indicator.as_deref(), &format!("{path}/CdtDbtInd"))?,
        &format!("{path}/CdtDbtInd"),
    )?;

    let id = required(
        details.refs.as_ref().and_then(|r| r.message_id.as_deref()),
        &format!("{details_path}/Refs/MsgId"),
    )?
    .to_string();

    let amount = parse_amount(
        details
            .amount_details
            .as_ref()
            .and_then(|a| a.transaction_amount.as_ref())
            .and_then(|t| t.amount.as_ref()),
        &format!("{details_path}/AmtDtls/TxAmt/Amt"),
    )?;

    // Banks put the dates on the entry; some repeat them per transaction
    let booking_date = entry_date(
        entry.booking_date.as_ref().or(details.booking_date.as_ref()),
        &format!("{path}/BookgDt/Dt"),
    )?;
    let value_date = entry_date(
        entry.value_date.as_ref().or(details.value_date.as_ref()),
        &format!("{path}/ValDt/Dt"),
    )?;

    let counterparty = parse_counterparty(details.related_parties.as_ref(), direction, &details_path)?;

    let remittance = details.remittance.as_ref();
    let reference = remittance
        .and_then(|r| r.structured.as_ref())
        .and_then(|s| s.creditor_reference.as_ref())
        .and_then(|c| c.reference.as_deref())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    let message = remittance
        .map(|r| {
            r.unstructured
                .iter()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|m| !m.is_empty());

    Ok(BankTransaction {
        id,
        account: account.to_string(),
        amount,
        direction,
        booking_date,
        value_date,
        counterparty,
        reference,
        message,
    })
}

fn parse_counterparty(
    parties: Option<&raw::RelatedParties>,
    direction: Direction,
    details_path: &str,
) -> LedgerResult<Counterparty> {
    // Incoming money names the debtor, outgoing money the creditor
    let (party, party_account, party_tag) = match direction {
        Direction::Credit => (
            parties.and_then(|p| p.debtor.as_ref()),
            parties.and_then(|p| p.debtor_account.as_ref()),
            "Dbtr",
        ),
        Direction::Debit => (
            parties.and_then(|p| p.creditor.as_ref()),
            parties.and_then(|p| p.creditor_account.as_ref()),
            "Cdtr",
        ),
    };

    let name = required(
        party.and_then(|p| p.name.as_deref()),
        &format!("{details_path}/RltdPties/{party_tag}/Nm"),
    )?
    .to_string();
    let account = party_account
        .and_then(|a| a.id.as_ref())
        .and_then(|id| id.iban.as_deref())
        .map(str::trim)
        .filter(|iban| !iban.is_empty())
        .map(str::to_string);

    Ok(Counterparty { name, account })
}

fn entry_date(holder: Option<&raw::DateHolder>, path: &str) -> LedgerResult<NaiveDate> {
    parse_date(required(holder.and_then(|d| d.date.as_deref()), path)?, path)
}

fn parse_amount(amount: Option<&raw::Amount>, path: &str) -> LedgerResult<Money> {
    let amount = amount.ok_or_else(|| missing(path))?;
    if let Some(currency) = amount.currency.as_deref() {
        ensure_eur(currency.trim())?;
    }
    let value = required(amount.value.as_deref(), path)?;
    Money::parse_decimal(value).map_err(|error| match error {
        LedgerError::Validation(message) => LedgerError::parse(path, message),
        other => other,
    })
}

fn parse_direction(indicator: &str, path: &str) -> LedgerResult<Direction> {
    Direction::from_code(indicator.trim()).ok_or_else(|| {
        LedgerError::parse(path, format!("unknown credit/debit indicator '{indicator}'"))
    })
}

fn parse_date(value: &str, path: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| LedgerError::parse(path, format!("invalid date '{value}': {e}")))
}

fn parse_timestamp(value: &str, path: &str) -> LedgerResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| LedgerError::parse(path, format!("invalid timestamp '{value}': {e}")))
}

/// Text of a required element; absent and blank both count as missing
fn required<'a>(value: Option<&'a str>, path: &str) -> LedgerResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(path))
}

fn missing(path: &str) -> LedgerError {
    LedgerError::parse(path, "required element is missing")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(indicator: &str, amount: &str) -> String {
        format!(
            r#"<Ntry>
                <CdtDbtInd>{indicator}</CdtDbtInd>
                <BookgDt><Dt>2024-03-01</Dt></BookgDt>
                <ValDt><Dt>2024-03-02</Dt></ValDt>
                <NtryDtls><TxDtls>
                    <Refs><MsgId>TX-1</MsgId></Refs>
                    <AmtDtls><TxAmt><Amt Ccy="EUR">{amount}</Amt></TxAmt></AmtDtls>
                    <RltdPties>
                        <Dbtr><Nm>Matti Meikäläinen</Nm></Dbtr>
                        <DbtrAcct><Id><IBAN>FI4950009420028730</IBAN></Id></DbtrAcct>
                        <Cdtr><Nm>Tarvike Oy</Nm></Cdtr>
                    </RltdPties>
                    <RmtInf><Strd><CdtrRefInf><Ref>00000012345</Ref></CdtrRefInf></Strd></RmtInf>
                </TxDtls></NtryDtls>
            </Ntry>"#
        )
    }

    fn document(entries: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
              <BkToCstmrAcctRpt><Rpt>
                <Id>R-1</Id>
                <CreDtTm>2024-03-03T06:00:00</CreDtTm>
                <Acct>
                  <Id><IBAN>FI2112345600000785</IBAN></Id>
                  <Ccy>EUR</Ccy>
                  <Svcr><FinInstnId><BIC>NDEAFIHH</BIC><Nm>Nordea</Nm><PstlAdr><StrtNm>Satamaradankatu 5</StrtNm></PstlAdr></FinInstnId></Svcr>
                </Acct>
                <Bal><Tp><CdOrPrtry><Cd>OPBD</Cd></CdOrPrtry></Tp><Amt Ccy="EUR">100.00</Amt><CdtDbtInd>CRDT</CdtDbtInd><Dt><Dt>2024-03-01</Dt></Dt></Bal>
                <Bal><Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp><Amt Ccy="EUR">87.66</Amt><CdtDbtInd>CRDT</CdtDbtInd><Dt><Dt>2024-03-02</Dt></Dt></Bal>
                {entries}
              </Rpt></BkToCstmrAcctRpt>
            </Document>"#
        )
    }

    #[test]
    fn test_debit_entry_amount_in_cents() {
        let statement = parse_statement(document(&entry("DBIT", "12.34")).as_bytes()).unwrap();
        assert_eq!(statement.entries.len(), 1);
        let txn = &statement.entries[0];
        assert_eq!(txn.amount, Money::from_cents(1234));
        assert_eq!(txn.direction, Direction::Debit);
        assert_eq!(txn.counterparty.name, "Tarvike Oy");
        assert_eq!(txn.reference.as_deref(), Some("00000012345"));
        assert!(statement.is_balanced());
    }

    #[test]
    fn test_credit_entry_uses_debtor() {
        let statement = parse_statement(document(&entry("CRDT", "5.00")).as_bytes()).unwrap();
        let txn = &statement.entries[0];
        assert_eq!(txn.counterparty.name, "Matti Meikäläinen");
        assert_eq!(txn.counterparty.account.as_deref(), Some("FI4950009420028730"));
        assert_eq!(txn.value_date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(statement.servicer.bic, "NDEAFIHH");
        assert_eq!(statement.opening_balance.amount, Money::from_cents(10_000));
    }

    #[test]
    fn test_short_decimal_rejected() {
        let err = parse_statement(document(&entry("DBIT", "12.3")).as_bytes()).unwrap_err();
        match err {
            LedgerError::Parse { path, .. } => assert!(path.ends_with("AmtDtls/TxAmt/Amt")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_indicator_rejected() {
        let err = parse_statement(document(&entry("RVSL", "1.00")).as_bytes()).unwrap_err();
        assert!(matches!(err, LedgerError::Parse { ref path, .. } if path.ends_with("CdtDbtInd")));
    }

    #[test]
    fn test_missing_closing_balance_names_path() {
        let xml = document("").replace(
            r#"<Bal><Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp><Amt Ccy="EUR">87.66</Amt><CdtDbtInd>CRDT</CdtDbtInd><Dt><Dt>2024-03-02</Dt></Dt></Bal>"#,
            "",
        );
        let err = parse_statement(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("CLBD"), "{err}");
    }

    #[test]
    fn test_non_eur_entry_rejected() {
        let xml = document(&entry("CRDT", "1.00").replace("Ccy=\"EUR\"", "Ccy=\"SEK\""));
        let err = parse_statement(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_entries_keep_document_order() {
        let later = entry("CRDT", "1.00")
            .replace("TX-1", "TX-B")
            .replace("2024-03-02", "2024-03-09");
        let earlier = entry("CRDT", "2.00").replace("TX-1", "TX-A");
        let statement = parse_statement(document(&format!("{later}{earlier}")).as_bytes()).unwrap();
        let ids: Vec<_> = statement.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["TX-B", "TX-A"]);
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_statement(b"<Document><BkToCstmrAcctRpt>").unwrap_err();
        assert_eq!(err.code(), "parse_error");
    }
}
