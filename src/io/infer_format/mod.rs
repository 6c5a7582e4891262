mod dispatch;
mod inference;

pub use dispatch::{ImagingIter, ImagingReader, ImagingReaderBuilder, ImagingReaderType};
pub use inference::{infer_format, infer_from_path, infer_from_stream, ImagingFormat};

#[cfg(test)]
mod test {
    use std::{
        fs,
        io::{self, Cursor, Write},
        path,
    };

    use crate::io::encoding::TextEncoding;
    use crate::io::mcd::decode::encode_f32_le;
    use crate::prelude::*;

    use super::*;

    const TXT: &str = "Start_push\tEnd_push\tPushes_duration\tX\tY\tZ\tDNA1(Ir191Di)\tSMA(Pr141Di)\n\
                       0\t1\t1\t0\t0\t0\t1\t2\n\
                       1\t2\t1\t1\t0\t0\t3\t4\n\
                       2\t3\t1\t0\t1\t0\t5\t6\n\
                       3\t4\t1\t1\t1\t0\t7\t8\n";

    fn mcd_bytes() -> Vec<u8> {
        let mut data = vec![0u8; 12];
        let rows: [[f32; 5]; 4] = [
            [0.0, 0.0, 0.0, 1.0, 2.0],
            [1.0, 0.0, 0.0, 3.0, 4.0],
            [0.0, 1.0, 0.0, 5.0, 6.0],
            [1.0, 1.0, 0.0, 7.0, 8.0],
        ];
        for row in rows.iter() {
            data.extend(encode_f32_le(row));
        }
        let end = data.len();
        let mut footer = format!(
            "<MCDPublic><Acquisition><ID>1</ID><DataStartOffset>12</DataStartOffset>\
             <DataEndOffset>{end}</DataEndOffset><SegmentDataFormat>Float</SegmentDataFormat>\
             <ValueBytes>4</ValueBytes></Acquisition>"
        );
        for (i, (name, label)) in [("X", "X"), ("Y", "Y"), ("Z", "Z"), ("Ir(191)", "DNA1"), ("Pr(141)", "SMA")]
            .iter()
            .enumerate()
        {
            footer.push_str(&format!(
                "<AcquisitionChannel><ChannelName>{name}</ChannelName><ChannelLabel>{label}</ChannelLabel>\
                 <OrderNumber>{i}</OrderNumber><AcquisitionID>1</AcquisitionID></AcquisitionChannel>"
            ));
        }
        footer.push_str("</MCDPublic>");
        data.extend(TextEncoding::Utf16Le.encode(&footer));
        data
    }

    #[test]
    fn infer_from_extension() {
        assert_eq!(infer_from_path("run/slide.mcd"), ImagingFormat::MCD);
        assert_eq!(infer_from_path("run/SLIDE.MCD"), ImagingFormat::MCD);
        assert_eq!(infer_from_path("run/ROI_001.txt"), ImagingFormat::Txt);
        assert_eq!(infer_from_path("run/slide.tiff"), ImagingFormat::Unknown);
        assert_eq!(infer_from_path(path::Path::new("run/slide")), ImagingFormat::Unknown);
    }

    #[test]
    fn test_infer_stream() -> io::Result<()> {
        let mut stream = Cursor::new(TXT.as_bytes().to_vec());
        assert_eq!(infer_from_stream(&mut stream)?, ImagingFormat::Txt);
        assert_eq!(stream.position(), 0);

        let mut stream = Cursor::new(mcd_bytes());
        assert_eq!(infer_from_stream(&mut stream)?, ImagingFormat::MCD);
        assert_eq!(stream.position(), 0);

        let mut stream = Cursor::new(b"X\tY\n1\t2\n".to_vec());
        assert_eq!(infer_from_stream(&mut stream)?, ImagingFormat::Unknown);
        Ok(())
    }

    #[test_log::test]
    fn test_mcd_equivalent_to_txt() -> io::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let txt_path = tmpdir.path().join("slide_1.txt");
        fs::write(&txt_path, TXT)?;
        // No extension, so the format has to be sniffed
        let mcd_path = tmpdir.path().join("slide");
        fs::File::create(&mcd_path)?.write_all(&mcd_bytes())?;
        assert_eq!(infer_format(&mcd_path)?, ImagingFormat::MCD);

        let mut txt_reader = ImagingReader::open_path(&txt_path)?;
        assert_eq!(txt_reader.as_format(), ImagingFormat::Txt);
        let mcd_reader = ImagingReader::open_path(&mcd_path)?;
        assert_eq!(mcd_reader.as_format(), ImagingFormat::MCD);
        assert_eq!(mcd_reader.len(), 1);

        let txt_raster = txt_reader.get_by_index(0)?;
        let mcd_rasters = mcd_reader.into_iter().collect::<io::Result<Vec<_>>>()?;
        assert_eq!(mcd_rasters.len(), 1);
        assert_eq!(txt_raster.channels, mcd_rasters[0].channels);
        assert_eq!(txt_raster.data, mcd_rasters[0].data);
        assert_eq!(txt_raster.name, "slide_1");
        assert_eq!(mcd_rasters[0].name, "slide_1");
        Ok(())
    }

    #[test]
    fn test_open_read_seek() -> io::Result<()> {
        let reader = ImagingReader::builder()
            .fill_missing(Some(0.0))
            .from_read_seek(Cursor::new(TXT.as_bytes().to_vec()))?;
        assert_eq!(reader.as_format(), ImagingFormat::Txt);
        let rasters: Vec<_> = reader.into_iter().collect();
        assert_eq!(rasters.len(), 1);
        assert_eq!(rasters[0].as_ref().unwrap().shape(), (2, 2, 2));

        let err = ImagingReaderType::open_read_seek(Cursor::new(vec![1u8; 64])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        Ok(())
    }
}
