//! Raw camt.053 tree as deserialized by quick-xml
//!
//! Every field is optional here; presence and shape are checked afterwards so
//! that a missing element can be reported by its full path.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Document {
    #[serde(rename = "BkToCstmrAcctRpt")]
    pub report: Option<AccountReport>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AccountReport {
    #[serde(rename = "Rpt")]
    pub rpt: Option<Report>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Report {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "CreDtTm")]
    pub created: Option<String>,
    #[serde(rename = "Acct")]
    pub account: Option<Account>,
    #[serde(rename = "Bal", default)]
    pub balances: Vec<Balance>,
    #[serde(rename = "Ntry", default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Account {
    #[serde(rename = "Id")]
    pub id: Option<AccountId>,
    #[serde(rename = "Ccy")]
    pub currency: Option<String>,
    #[serde(rename = "Svcr")]
    pub servicer: Option<Servicer>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AccountId {
    #[serde(rename = "IBAN")]
    pub iban: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Servicer {
    #[serde(rename = "FinInstnId")]
    pub institution: Option<FinancialInstitution>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FinancialInstitution {
    #[serde(rename = "BIC", alias = "BICFI")]
    pub bic: Option<String>,
    #[serde(rename = "Nm")]
    pub name: Option<String>,
    #[serde(rename = "PstlAdr")]
    pub address: Option<PostalAddress>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PostalAddress {
    #[serde(rename = "StrtNm")]
    pub street: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Balance {
    #[serde(rename = "Tp")]
    pub balance_type: Option<BalanceType>,
    #[serde(rename = "Amt")]
    pub amount: Option<Amount>,
    #[serde(rename = "CdtDbtInd")]
    pub indicator: Option<String>,
    #[serde(rename = "Dt")]
    pub date: Option<DateHolder>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BalanceType {
    #[serde(rename = "CdOrPrtry")]
    pub code_or_proprietary: Option<CodeOrProprietary>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CodeOrProprietary {
    #[serde(rename = "Cd")]
    pub code: Option<String>,
}

impl Balance {
    pub fn code(&self) -> Option<&str> {
        self.balance_type
            .as_ref()
            .and_then(|t| t.code_or_proprietary.as_ref())
            .and_then(|c| c.code.as_deref())
            .map(str::trim)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Amount {
    #[serde(rename = "@Ccy")]
    pub currency: Option<String>,
    #[serde(rename = "$text")]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DateHolder {
    #[serde(rename = "Dt")]
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Entry {
    #[serde(rename = "CdtDbtInd")]
    pub indicator: Option<String>,
    #[serde(rename = "BookgDt")]
    pub booking_date: Option<DateHolder>,
    #[serde(rename = "ValDt")]
    pub value_date: Option<DateHolder>,
    #[serde(rename = "NtryDtls")]
    pub details: Option<EntryDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EntryDetails {
    #[serde(rename = "TxDtls")]
    pub transaction: Option<TransactionDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TransactionDetails {
    #[serde(rename = "Refs")]
    pub refs: Option<References>,
    #[serde(rename = "AmtDtls")]
    pub amount_details: Option<AmountDetails>,
    #[serde(rename = "BookgDt")]
    pub booking_date: Option<DateHolder>,
    #[serde(rename = "ValDt")]
    pub value_date: Option<DateHolder>,
    #[serde(rename = "RltdPties")]
    pub related_parties: Option<RelatedParties>,
    #[serde(rename = "RmtInf")]
    pub remittance: Option<RemittanceInformation>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct References {
    #[serde(rename = "MsgId")]
    pub message_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AmountDetails {
    #[serde(rename = "TxAmt")]
    pub transaction_amount: Option<TransactionAmount>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TransactionAmount {
    #[serde(rename = "Amt")]
    pub amount: Option<Amount>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RelatedParties {
    #[serde(rename = "Dbtr")]
    pub debtor: Option<Party>,
    #[serde(rename = "DbtrAcct")]
    pub debtor_account: Option<PartyAccount>,
    #[serde(rename = "Cdtr")]
    pub creditor: Option<Party>,
    #[serde(rename = "CdtrAcct")]
    pub creditor_account: Option<PartyAccount>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Party {
    #[serde(rename = "Nm")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PartyAccount {
    #[serde(rename = "Id")]
    pub id: Option<AccountId>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RemittanceInformation {
    #[serde(rename = "Ustrd", default)]
    pub unstructured: Vec<String>,
    #[serde(rename = "Strd")]
    pub structured: Option<StructuredRemittance>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StructuredRemittance {
    #[serde(rename = "CdtrRefInf")]
    pub creditor_reference: Option<CreditorReference>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreditorReference {
    #[serde(rename = "Ref")]
    pub reference: Option<String>,
}
